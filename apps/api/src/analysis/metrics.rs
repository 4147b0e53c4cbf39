//! Local metrics: deterministic statistics over the candidate's turns. No I/O.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::analysis::{Speaker, TranscriptTurn};

/// Clarity is not derived from the audio signal yet; every session gets this baseline.
pub const BASELINE_CLARITY: f64 = 100.0;
/// Answer latency is not measured from turn timing yet; every session gets this baseline.
pub const BASELINE_LATENCY_SECS: f64 = 2.5;

/// Values are rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalMetrics {
    /// Mean words per candidate turn.
    pub avg_words: f64,
    /// Distinct lowercased words over total words, as a percentage.
    pub vocab_richness: f64,
    /// Percentage.
    pub clarity: f64,
    /// Seconds.
    pub avg_latency: f64,
}

pub fn compute(turns: &[TranscriptTurn]) -> LocalMetrics {
    let candidate_turns: Vec<&TranscriptTurn> =
        turns.iter().filter(|t| t.role == Speaker::User).collect();

    let mut total_words = 0usize;
    let mut distinct = HashSet::new();
    for turn in &candidate_turns {
        for word in turn.text().split_whitespace() {
            total_words += 1;
            distinct.insert(word.to_lowercase());
        }
    }

    let avg_words = if candidate_turns.is_empty() {
        0.0
    } else {
        total_words as f64 / candidate_turns.len() as f64
    };
    let vocab_richness = if total_words == 0 {
        0.0
    } else {
        distinct.len() as f64 / total_words as f64 * 100.0
    };

    LocalMetrics {
        avg_words: round1(avg_words),
        vocab_richness: round1(vocab_richness),
        clarity: BASELINE_CLARITY,
        avg_latency: BASELINE_LATENCY_SECS,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Speaker, message: &str) -> TranscriptTurn {
        TranscriptTurn {
            role,
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn test_empty_transcript_is_zero_not_nan() {
        let metrics = compute(&[]);
        assert_eq!(metrics.avg_words, 0.0);
        assert_eq!(metrics.vocab_richness, 0.0);
        assert!(metrics.avg_words.is_finite() && metrics.vocab_richness.is_finite());
    }

    #[test]
    fn test_agent_only_transcript_is_zero() {
        let metrics = compute(&[turn(Speaker::Agent, "Welcome to the interview")]);
        assert_eq!(metrics.avg_words, 0.0);
        assert_eq!(metrics.vocab_richness, 0.0);
    }

    #[test]
    fn test_only_candidate_turns_count() {
        let turns = vec![
            turn(Speaker::Agent, "What do you do?"),
            turn(Speaker::User, "I build  compilers"),
            turn(Speaker::Agent, "And before that?"),
            turn(Speaker::User, "I built compilers too"),
        ];
        let metrics = compute(&turns);
        // 3 + 4 words over 2 turns
        assert_eq!(metrics.avg_words, 3.5);
        // i, build, compilers, built, too = 5 distinct of 7
        assert_eq!(metrics.vocab_richness, 71.4);
    }

    #[test]
    fn test_vocab_is_case_insensitive() {
        let metrics = compute(&[turn(Speaker::User, "Rust rust RUST")]);
        assert_eq!(metrics.vocab_richness, 33.3);
    }

    #[test]
    fn test_placeholders_are_fixed() {
        let metrics = compute(&[turn(Speaker::User, "anything")]);
        assert_eq!(metrics.clarity, BASELINE_CLARITY);
        assert_eq!(metrics.avg_latency, BASELINE_LATENCY_SECS);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let turns = vec![
            turn(Speaker::User, "The quick brown fox"),
            turn(Speaker::User, "jumps over the lazy dog"),
        ];
        let first = compute(&turns);
        let second = compute(&turns);
        assert_eq!(first.avg_words.to_bits(), second.avg_words.to_bits());
        assert_eq!(first.vocab_richness.to_bits(), second.vocab_richness.to_bits());
        assert_eq!(first, second);
    }
}
