//! Session lifecycle: status transitions and the retrieval/scoring pipeline they trigger.
//!
//! ```text
//! pending/scheduled --(start)--> in-progress --(complete)--> completed
//! ```
//!
//! Completing with a `conversation_id` runs, strictly in order: fetch audio, fetch
//! transcript, score, delete the provider conversation. Retrieval and cleanup are
//! best-effort and surface as warnings. Scoring failures fail the whole update.
//! The completed edge is a compare-and-swap in the store, so the owner's quota is bumped
//! once per session no matter how often the completion is re-sent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::judge::Judge;
use crate::analysis::{score_transcript, AnalysisError, ScoredTranscript};
use crate::conversation::retrieval::{delete_conversation, fetch_audio, fetch_transcript};
use crate::conversation::retry::RetryPolicy;
use crate::conversation::ConversationProvider;
use crate::errors::AppError;
use crate::models::session::{
    CandidateResponse, InterviewSession, NewSession, SessionKind, SessionStatus,
};
use crate::models::template::TemplateRow;
use crate::sessions::artifacts::AudioStore;
use crate::sessions::store::SessionStore;

/// Validated body of a session update. Unknown fields are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionUpdate {
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub responses: Option<Vec<CandidateResponse>>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, alias = "conversationId")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub template_id: Uuid,
    pub kind: SessionKind,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub candidate_email: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    pub session: InterviewSession,
    /// Best-effort steps that did not succeed.
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionStart {
    pub session: InterviewSession,
    pub template: TemplateRow,
}

#[derive(Clone)]
pub struct SessionManager {
    pub store: Arc<dyn SessionStore>,
    pub provider: Arc<dyn ConversationProvider>,
    pub judge: Arc<dyn Judge>,
    pub audio: Arc<dyn AudioStore>,
    pub retrieval: RetryPolicy,
    /// Upper bound on retrieval plus scoring within one update.
    pub pipeline_timeout: Duration,
}

impl SessionManager {
    pub async fn create_session(
        &self,
        tenant_id: Uuid,
        request: CreateSessionRequest,
    ) -> Result<InterviewSession, AppError> {
        let template = self
            .store
            .find_template(request.template_id)
            .await?
            .filter(|t| t.available_to(tenant_id))
            .ok_or_else(|| {
                AppError::NotFound(format!("Template {} not found", request.template_id))
            })?;

        let session = self
            .store
            .create_session(NewSession {
                tenant_id,
                template_id: template.id,
                kind: request.kind,
                candidate_name: request.candidate_name,
                candidate_email: request.candidate_email,
                scheduled_at: request.scheduled_at,
            })
            .await?;
        Ok(session)
    }

    /// Loads a session within the caller's scope, 404 otherwise.
    pub async fn get_owned(
        &self,
        session_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<InterviewSession, AppError> {
        self.store
            .find_session(session_id, tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
    }

    /// Session plus template for a candidate about to start. Finished sessions are single-use.
    pub async fn get_for_start(
        &self,
        session_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<SessionStart, AppError> {
        let session = self.get_owned(session_id, tenant_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(AppError::SessionCompleted(session.id));
        }
        let template = self
            .store
            .find_template(session.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {} not found", session.template_id)))?;
        Ok(SessionStart { session, template })
    }

    /// Signed URL for opening the live conversation with the template's agent.
    pub async fn signed_url(&self, session_id: Uuid, tenant_id: Uuid) -> Result<String, AppError> {
        let SessionStart { template, .. } = self.get_for_start(session_id, tenant_id).await?;
        let agent_id = template.agent_id.ok_or_else(|| {
            AppError::NotFound(format!("Template {} has no voice agent", template.id))
        })?;
        Ok(self.provider.get_signed_url(&agent_id).await?)
    }

    pub async fn update_session(
        &self,
        session_id: Uuid,
        tenant_id: Uuid,
        update: SessionUpdate,
    ) -> Result<UpdateOutcome, AppError> {
        let mut session = self.get_owned(session_id, tenant_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(AppError::SessionCompleted(session.id));
        }
        if let Some(target) = update.status {
            session.status.check_transition(target)?;
        }
        if update.conversation_id.is_some() && update.status != Some(SessionStatus::Completed) {
            return Err(AppError::Validation(
                "conversation_id can only be sent when completing the session".to_string(),
            ));
        }
        if let (Some(recorded), Some(sent)) = (&session.conversation_id, &update.conversation_id) {
            if recorded != sent {
                return Err(AppError::Validation(format!(
                    "session already has conversation {recorded}"
                )));
            }
        }

        if let Some(responses) = update.responses {
            session.responses.extend(responses);
        }
        if let Some(score) = update.score {
            session.client_score = Some(score);
        }

        let mut warnings = Vec::new();
        if let Some(conversation_id) = update.conversation_id {
            let had_transcript = session.transcript.is_some();
            let stage =
                self.conversation_stage(&mut session, conversation_id.clone(), &mut warnings);
            let timed = tokio::time::timeout(self.pipeline_timeout, stage).await;
            let limit_secs = self.pipeline_timeout.as_secs();
            let outcome = match timed {
                Ok(outcome) => outcome,
                // The transcript is in hand, so only scoring is outstanding. Treat it like a
                // judge failure: the completion is retried and scores the stored transcript.
                Err(_) if session.transcript.is_some() => {
                    warn!(
                        "Scoring for session {} exceeded {limit_secs}s after the transcript was retrieved",
                        session.id
                    );
                    if !had_transcript {
                        delete_conversation(self.provider.as_ref(), &conversation_id).await;
                    }
                    Err(AppError::ScoringTimeout(limit_secs))
                }
                Err(_) => {
                    warn!(
                        "Retrieval for session {} exceeded {limit_secs}s",
                        session.id
                    );
                    warnings.push(format!(
                        "Retrieval timed out after {limit_secs}s; the session was saved without a score"
                    ));
                    Ok(())
                }
            };

            if let Err(e) = outcome {
                // Keep what was retrieved; leave status alone so the completion can be retried.
                session.updated_at = Utc::now();
                self.store.save_session(&session).await?;
                return Err(e);
            }
        }

        let now = Utc::now();
        session.updated_at = now;
        match update.status {
            Some(SessionStatus::Completed) => {
                session.status = SessionStatus::Completed;
                session.completed_at = Some(now);
                if !self.store.complete_session(&session).await? {
                    return Err(AppError::SessionCompleted(session.id));
                }
                info!(
                    "Session {} completed (score: {:?}), quota updated for tenant {}",
                    session.id,
                    session.final_score.as_ref().map(|s| s.score),
                    session.tenant_id
                );
            }
            status => {
                if let Some(status) = status {
                    if status == SessionStatus::InProgress && session.started_at.is_none() {
                        session.started_at = Some(now);
                    }
                    session.status = status;
                }
                if !self.store.save_session(&session).await? {
                    return Err(AppError::SessionCompleted(session.id));
                }
            }
        }

        Ok(UpdateOutcome { session, warnings })
    }

    /// Records the conversation id and, unless already done, retrieves and scores it.
    async fn conversation_stage(
        &self,
        session: &mut InterviewSession,
        conversation_id: String,
        warnings: &mut Vec<String>,
    ) -> Result<(), AppError> {
        match session.conversation_id.clone() {
            None => {
                session.conversation_id = Some(conversation_id.clone());
                self.retrieve_and_score(session, &conversation_id, warnings)
                    .await
            }
            Some(recorded) if recorded == conversation_id => {
                // A retried completion: only scoring may still be outstanding.
                if session.final_score.is_some() {
                    return Ok(());
                }
                let Some(transcript) = session.transcript.clone() else {
                    return Ok(());
                };
                let scored = score_transcript(self.judge.as_ref(), &transcript).await;
                apply_score(session, scored)
            }
            Some(recorded) => Err(AppError::Validation(format!(
                "session already has conversation {recorded}"
            ))),
        }
    }

    async fn retrieve_and_score(
        &self,
        session: &mut InterviewSession,
        conversation_id: &str,
        warnings: &mut Vec<String>,
    ) -> Result<(), AppError> {
        let provider = self.provider.as_ref();

        match fetch_audio(provider, conversation_id, &self.retrieval).await {
            Some(audio) => match self.audio.put_audio(conversation_id, audio).await {
                Ok(location) => session.audio_ref = Some(location),
                Err(e) => {
                    warn!("Could not store audio for session {}: {e}", session.id);
                    warnings.push("The interview recording could not be stored".to_string());
                }
            },
            None => warnings.push("The interview recording could not be retrieved".to_string()),
        }

        let Some(transcript) = fetch_transcript(provider, conversation_id, &self.retrieval).await
        else {
            warnings.push(
                "The transcript could not be retrieved; the session was not scored".to_string(),
            );
            return Ok(());
        };
        session.transcript = Some(transcript.clone());

        let scored = score_transcript(self.judge.as_ref(), &transcript).await;

        // Cleanup runs whatever scoring did; failures are only logged.
        delete_conversation(provider, conversation_id).await;

        apply_score(session, scored)
    }
}

fn apply_score(
    session: &mut InterviewSession,
    scored: Result<ScoredTranscript, AnalysisError>,
) -> Result<(), AppError> {
    let scored = scored?;
    session.analysis = Some(scored.analysis);
    session.final_score = Some(scored.final_score);
    Ok(())
}
