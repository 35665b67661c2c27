//! Judgments attached to leaf requirements.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::domain::rubric::NodePath;

/// Reasoning tag for replies with no parseable JSON object.
pub const TAG_PARSING_FALLBACK: &str = "[AUTOMATIC PARSING FALLBACK]";
/// Reasoning tag for JSON replies without a usable `score`.
pub const TAG_PARSING_ERROR: &str = "[PARSING ERROR]";
/// Reasoning tag for failed judge invocations.
pub const TAG_EVALUATION_ERROR: &str = "[EVALUATION ERROR]";
/// Reasoning tag for leaves that exhausted their retries.
pub const TAG_FINAL_FALLBACK: &str = "[FINAL FALLBACK]";

/// Tags that make a judgment eligible for the retry pass.
pub const RETRYABLE_TAGS: [&str; 3] = [
    TAG_PARSING_FALLBACK,
    TAG_PARSING_ERROR,
    TAG_EVALUATION_ERROR,
];

/// Token accounting for one or more judge calls. Purely additive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// One judge's binary verdict on one leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafJudgment {
    pub score: u8,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub tokens: TokenUsage,
    /// Attempts consumed by the retry pass; absent for first-pass results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl LeafJudgment {
    pub fn new(
        score: u8,
        reasoning: impl Into<String>,
        evidence: impl Into<String>,
        tokens: TokenUsage,
    ) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
            evidence: evidence.into(),
            tokens,
            retry_count: None,
        }
    }

    /// Whether the reasoning carries one of the retry-eligible tags.
    pub fn needs_retry(&self) -> bool {
        let reasoning = self.reasoning.to_lowercase();
        RETRYABLE_TAGS
            .iter()
            .any(|tag| reasoning.contains(&tag.to_lowercase()))
    }

    /// Whether the judgment ended in an error or failure state.
    pub fn is_error(&self) -> bool {
        let reasoning = self.reasoning.to_lowercase();
        reasoning.contains("error") || reasoning.contains("failed")
    }
}

/// Judgments from several judges merged for one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedLeafJudgment {
    pub score: f64,
    pub std: f64,
    pub reasoning: String,
    pub evidence: String,
    pub tokens: TokenUsage,
    pub individual_scores: Vec<f64>,
    pub combination_method: String,
    pub num_llms: usize,
}

/// Anything that can be attached to a leaf and propagated upwards.
pub trait LeafScore {
    /// Whether scored trees built from this judgment carry a `std` column.
    const HAS_SPREAD: bool = false;

    fn score(&self) -> f64;

    /// Spread across judges, `None` for single-judge results.
    fn std(&self) -> Option<f64> {
        None
    }
}

impl LeafScore for LeafJudgment {
    fn score(&self) -> f64 {
        f64::from(self.score)
    }
}

impl LeafScore for CombinedLeafJudgment {
    const HAS_SPREAD: bool = true;

    fn score(&self) -> f64 {
        self.score
    }

    fn std(&self) -> Option<f64> {
        Some(self.std)
    }
}

/// Leaf judgments of one pass keyed by path.
pub type JudgmentMap = BTreeMap<NodePath, LeafJudgment>;

/// Combined judgments keyed by path.
pub type CombinedJudgmentMap = BTreeMap<NodePath, CombinedLeafJudgment>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_tags_match_case_insensitively() {
        let judgment = LeafJudgment::new(1, "[evaluation error]: boom", "", TokenUsage::default());
        assert!(judgment.needs_retry());

        let clean = LeafJudgment::new(1, "Install steps are covered", "", TokenUsage::default());
        assert!(!clean.needs_retry());
    }

    #[test]
    fn final_fallback_is_not_retried_again() {
        let judgment = LeafJudgment::new(
            0,
            format!("{TAG_FINAL_FALLBACK} after 3 attempts"),
            "",
            TokenUsage::default(),
        );
        assert!(!judgment.needs_retry());
    }

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::new(10, 2);
        total += TokenUsage::new(5, 1);
        assert_eq!(total, TokenUsage::new(15, 3));
        assert_eq!(total.total(), 18);
    }

    #[test]
    fn missing_optional_fields_deserialize_with_defaults() {
        let judgment: LeafJudgment = serde_json::from_str(r#"{"score": 1}"#).unwrap();
        assert_eq!(judgment.score, 1);
        assert_eq!(judgment.tokens, TokenUsage::default());
        assert!(judgment.retry_count.is_none());
    }
}
