use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::fusion::FinalScore;
use crate::analysis::Analysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move session from {from} to {to}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Scheduled => 1,
            SessionStatus::InProgress => 2,
            SessionStatus::Completed => 3,
        }
    }

    /// Status only moves forward; `completed` is terminal. Re-asserting the current
    /// status is allowed and changes nothing.
    pub fn check_transition(self, to: SessionStatus) -> Result<(), TransitionError> {
        if self == SessionStatus::Completed || to.rank() < self.rank() {
            return Err(TransitionError { from: self, to });
        }
        Ok(())
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "scheduled" => Ok(SessionStatus::Scheduled),
            "in-progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// Which flow created the session. Company interviews, student practice and general-user
/// sessions share one lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Interview,
    Practice,
    General,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Interview => "interview",
            SessionKind::Practice => "practice",
            SessionKind::General => "general",
        }
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interview" => Ok(SessionKind::Interview),
            "practice" => Ok(SessionKind::Practice),
            "general" => Ok(SessionKind::General),
            other => Err(format!("unknown session kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateResponse {
    pub question_id: String,
    #[serde(default)]
    pub question: Option<String>,
    pub response: String,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Fields supplied when a flow opens a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub tenant_id: Uuid,
    pub template_id: Uuid,
    pub kind: SessionKind,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterviewSession {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub template_id: Uuid,
    pub kind: SessionKind,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub status: SessionStatus,
    pub conversation_id: Option<String>,
    pub responses: Vec<CandidateResponse>,
    pub client_score: Option<f64>,
    /// Provider transcript as retrieved, unvalidated.
    pub transcript: Option<Value>,
    pub audio_ref: Option<String>,
    pub analysis: Option<Analysis>,
    pub final_score: Option<FinalScore>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(new: NewSession, now: DateTime<Utc>) -> Self {
        let status = if new.scheduled_at.is_some() {
            SessionStatus::Scheduled
        } else {
            SessionStatus::Pending
        };
        Self {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            template_id: new.template_id,
            kind: new.kind,
            candidate_name: new.candidate_name,
            candidate_email: new.candidate_email,
            status,
            conversation_id: None,
            responses: Vec::new(),
            client_score: None,
            transcript: None,
            audio_ref: None,
            analysis: None,
            final_score: None,
            scheduled_at: new.scheduled_at,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub template_id: Uuid,
    pub kind: String,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub status: String,
    pub conversation_id: Option<String>,
    pub responses: Value,
    pub client_score: Option<f64>,
    pub transcript: Option<Value>,
    pub audio_ref: Option<String>,
    pub analysis: Option<Value>,
    pub final_score: Option<Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("session {id} has an unreadable {field}: {reason}")]
pub struct CorruptRow {
    pub id: Uuid,
    pub field: &'static str,
    pub reason: String,
}

impl TryFrom<SessionRow> for InterviewSession {
    type Error = CorruptRow;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |field: &'static str| move |reason: String| CorruptRow { id, field, reason };

        Ok(InterviewSession {
            id,
            tenant_id: row.tenant_id,
            template_id: row.template_id,
            kind: row.kind.parse().map_err(corrupt("kind"))?,
            candidate_name: row.candidate_name,
            candidate_email: row.candidate_email,
            status: row.status.parse().map_err(corrupt("status"))?,
            conversation_id: row.conversation_id,
            responses: decode(row.responses).map_err(corrupt("responses"))?,
            client_score: row.client_score,
            transcript: row.transcript,
            audio_ref: row.audio_ref,
            analysis: row
                .analysis
                .map(decode)
                .transpose()
                .map_err(corrupt("analysis"))?,
            final_score: row
                .final_score
                .map(decode)
                .transpose()
                .map_err(corrupt("final_score"))?,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| e.to_string())
}
