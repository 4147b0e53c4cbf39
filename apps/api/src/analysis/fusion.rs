//! Score fusion: one 0-100 score from local metrics and judge ratings.
//!
//! Arithmetic is kept exactly as historical scores were computed:
//! `local = (avg_words + vocab_richness / 10 + clarity) / 3`,
//! `judge = mean of the five ratings` (1-10 scale, not rescaled),
//! `score = round(0.4 * local + 0.6 * judge)`.
//! The inputs sit on different scales; changing that changes every stored score.

use serde::{Deserialize, Serialize};

use crate::analysis::judge::{JudgeMetrics, JudgeScores};
use crate::analysis::metrics::LocalMetrics;

pub const LOCAL_WEIGHT: f64 = 0.4;
pub const JUDGE_WEIGHT: f64 = 0.6;

/// Every input that went into a score, by field name, for audit and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(flatten)]
    pub local: LocalMetrics,
    #[serde(flatten)]
    pub judge: JudgeScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub score: u32,
    pub breakdown: ScoreBreakdown,
    /// The judge's recommendation, unchanged.
    pub interpretation: String,
}

pub fn local_score(metrics: &LocalMetrics) -> f64 {
    (metrics.avg_words + metrics.vocab_richness / 10.0 + metrics.clarity) / 3.0
}

pub fn fuse(local: &LocalMetrics, judge: &JudgeMetrics) -> FinalScore {
    let blended = LOCAL_WEIGHT * local_score(local) + JUDGE_WEIGHT * judge.scores.mean();

    FinalScore {
        score: blended.round().max(0.0) as u32,
        breakdown: ScoreBreakdown {
            local: *local,
            judge: judge.scores,
        },
        interpretation: judge.recommendation.clone(),
    }
}
