//! Judge: subjective 1-10 ratings of a transcript from an external language model.
//!
//! The model sometimes nests its ratings under `scores` and sometimes returns them flat.
//! [`normalize_judge_response`] is the one place that shape is resolved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::analysis::prompts::JUDGE_PROMPT;
use crate::analysis::TranscriptTurn;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};

const MIN_RATING: f64 = 1.0;
const MAX_RATING: f64 = 10.0;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed judge response: {0}")]
    Malformed(String),

    #[error("judge rating '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    pub correctness: f64,
    pub relevance: f64,
    pub completeness: f64,
    pub confidence: f64,
    pub professionalism: f64,
}

impl JudgeScores {
    fn fields(&self) -> [(&'static str, f64); 5] {
        [
            ("correctness", self.correctness),
            ("relevance", self.relevance),
            ("completeness", self.completeness),
            ("confidence", self.confidence),
            ("professionalism", self.professionalism),
        ]
    }

    pub fn mean(&self) -> f64 {
        self.fields().iter().map(|(_, v)| v).sum::<f64>() / 5.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeMetrics {
    #[serde(flatten)]
    pub scores: JudgeScores,
    /// Intended to be Hire, Maybe or Reject, but stored as the model wrote it.
    pub recommendation: String,
}

/// Decodes a raw judge reply: the nested `{"scores": {...}}` shape first, then flat.
pub fn normalize_judge_response(raw: Value) -> Result<JudgeMetrics, JudgeError> {
    if !raw.is_object() {
        return Err(JudgeError::Malformed(format!("expected a JSON object, got {raw}")));
    }

    let ratings = match raw.get("scores") {
        Some(nested) if nested.is_object() => nested,
        _ => &raw,
    };
    let scores = JudgeScores::deserialize(ratings)
        .map_err(|e| JudgeError::Malformed(e.to_string()))?;

    for (field, value) in scores.fields() {
        if !value.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(JudgeError::OutOfRange { field, value });
        }
    }

    let recommendation = [&raw, ratings]
        .into_iter()
        .flat_map(|v| [v.get("recommendation"), v.get("final_recommendation")])
        .flatten()
        .find_map(Value::as_str)
        .ok_or_else(|| JudgeError::Malformed("missing recommendation".to_string()))?;

    Ok(JudgeMetrics {
        scores,
        recommendation: recommendation.trim().to_string(),
    })
}

#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, turns: &[TranscriptTurn]) -> Result<JudgeMetrics, JudgeError>;
}

/// Judge backed by the LLM client.
pub struct LlmJudge(pub LlmClient);

#[async_trait]
impl Judge for LlmJudge {
    async fn evaluate(&self, turns: &[TranscriptTurn]) -> Result<JudgeMetrics, JudgeError> {
        let transcript = serde_json::to_string_pretty(turns)
            .map_err(|e| JudgeError::Malformed(format!("cannot serialize transcript: {e}")))?;
        let prompt = JUDGE_PROMPT.replace("{transcript}", &transcript);

        info!("Querying LLM judge for {} transcript turns", turns.len());
        let raw: Value = self.0.call_json(&prompt, JSON_ONLY_SYSTEM).await?;

        let metrics = normalize_judge_response(raw)?;
        info!(
            "Judge metrics received: mean {:.2}, recommendation {}",
            metrics.scores.mean(),
            metrics.recommendation
        );
        Ok(metrics)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_and_flat_normalize_identically() {
        let nested = json!({
            "scores": {
                "correctness": 7, "relevance": 7, "completeness": 6,
                "confidence": 8, "professionalism": 9
            },
            "recommendation": "Hire"
        });
        let flat = json!({
            "correctness": 7, "relevance": 7, "completeness": 6,
            "confidence": 8, "professionalism": 9,
            "recommendation": "Hire"
        });

        let a = normalize_judge_response(nested).unwrap();
        let b = normalize_judge_response(flat).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.scores.completeness, 6.0);
    }

    #[test]
    fn test_recommendation_inside_scores_is_found() {
        let raw = json!({
            "scores": {
                "correctness": 5, "relevance": 5, "completeness": 5,
                "confidence": 5, "professionalism": 5,
                "final_recommendation": "Maybe"
            }
        });
        assert_eq!(normalize_judge_response(raw).unwrap().recommendation, "Maybe");
    }

    #[test]
    fn test_missing_rating_is_malformed() {
        let raw = json!({ "correctness": 7, "recommendation": "Hire" });
        assert!(matches!(
            normalize_judge_response(raw),
            Err(JudgeError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_recommendation_is_malformed() {
        let raw = json!({
            "correctness": 7, "relevance": 7, "completeness": 7,
            "confidence": 7, "professionalism": 7
        });
        assert!(matches!(
            normalize_judge_response(raw),
            Err(JudgeError::Malformed(_))
        ));
    }

    #[test]
    fn test_out_of_range_rating_rejected() {
        let raw = json!({
            "correctness": 70, "relevance": 7, "completeness": 7,
            "confidence": 7, "professionalism": 7, "recommendation": "Hire"
        });
        match normalize_judge_response(raw) {
            Err(JudgeError::OutOfRange { field, value }) => {
                assert_eq!(field, "correctness");
                assert_eq!(value, 70.0);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_non_object_reply_is_malformed() {
        assert!(matches!(
            normalize_judge_response(json!(["Hire"])),
            Err(JudgeError::Malformed(_))
        ));
    }

    #[test]
    fn test_judge_mean() {
        let scores = JudgeScores {
            correctness: 9.0,
            relevance: 9.0,
            completeness: 8.0,
            confidence: 9.0,
            professionalism: 9.0,
        };
        assert!((scores.mean() - 8.8).abs() < 1e-9);
    }
}
