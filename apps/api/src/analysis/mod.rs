// Transcript analysis: deterministic local metrics + LLM judge ratings, fused into one score.
// All LLM calls go through llm_client, via the Judge trait.

pub mod fusion;
pub mod judge;
pub mod metrics;
pub mod prompts;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::analysis::fusion::{fuse, FinalScore};
use crate::analysis::judge::{Judge, JudgeError, JudgeMetrics};
use crate::analysis::metrics::LocalMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
    #[serde(other)]
    Other,
}

/// One turn of a conversation transcript as the provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: Speaker,
    /// Null for turns that carry no speech (tool calls).
    #[serde(default)]
    pub message: Option<String>,
}

impl TranscriptTurn {
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub local_metrics: LocalMetrics,
    pub judge_metrics: JudgeMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTranscript {
    pub analysis: Analysis,
    pub final_score: FinalScore,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid transcript format: {0}")]
    InvalidTranscript(String),

    #[error("judge failed: {0}")]
    Judge(#[from] JudgeError),
}

/// Decodes a stored or freshly retrieved transcript into turns.
/// Accepts a JSON array of turns or a string containing one.
pub fn parse_transcript(transcript: &Value) -> Result<Vec<TranscriptTurn>, AnalysisError> {
    let parsed = match transcript {
        Value::String(encoded) => serde_json::from_str(encoded),
        other => Vec::<TranscriptTurn>::deserialize(other),
    };
    parsed.map_err(|e| AnalysisError::InvalidTranscript(e.to_string()))
}

/// Full scoring pass over one transcript. Judge failures are returned, never defaulted.
pub async fn score_transcript(
    judge: &dyn Judge,
    transcript: &Value,
) -> Result<ScoredTranscript, AnalysisError> {
    let turns = parse_transcript(transcript)?;

    let local_metrics = metrics::compute(&turns);
    info!("Local metrics calculated: {local_metrics:?}");

    let judge_metrics = judge.evaluate(&turns).await?;
    let final_score = fuse(&local_metrics, &judge_metrics);
    info!("Final score calculated: {}", final_score.score);

    Ok(ScoredTranscript {
        analysis: Analysis {
            local_metrics,
            judge_metrics,
        },
        final_score,
    })
}
