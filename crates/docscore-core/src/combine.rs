//! Multi-judge aggregation.
//!
//! Several judges score the same rubric independently. Their leaf judgments
//! are merged path by path with a selectable [`CombinationMethod`], the
//! spread between judges is kept as a sample standard deviation, and the
//! merged leaves are propagated again over the first judge's tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CombinedJudgmentMap, CombinedLeafJudgment, DocscoreError, JudgmentMap, LeafJudgment,
    TokenUsage,
};
use crate::obs;
use crate::propagate::{leaf_evaluations, propagate, rubric_shape, ScoredNode};

/// Fewest judge results a combination accepts.
pub const MIN_EVALUATIONS: usize = 2;

/// How per-judge leaf scores are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMethod {
    #[default]
    Average,
    MajorityVote,
    WeightedAverage,
    Max,
    Min,
}

impl CombinationMethod {
    pub const ALL: [CombinationMethod; 5] = [
        Self::Average,
        Self::MajorityVote,
        Self::WeightedAverage,
        Self::Max,
        Self::Min,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::MajorityVote => "majority_vote",
            Self::WeightedAverage => "weighted_average",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

impl fmt::Display for CombinationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombinationMethod {
    type Err = DocscoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DocscoreError::UnknownMethod(s.to_string()))
    }
}

/// Settings for one combination run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineConfig {
    pub method: CombinationMethod,
    /// Positional judge weights, used by `weighted_average` only.
    pub weights: Option<Vec<f64>>,
    /// Recorded in the output metadata; does not filter anything.
    pub confidence_threshold: f64,
}

/// Parse a comma-separated weight list such as `"0.4,0.3,0.3"`.
pub fn parse_weights(raw: &str) -> Result<Vec<f64>, DocscoreError> {
    raw.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|w| w.is_finite() && *w >= 0.0)
                .ok_or_else(|| DocscoreError::InvalidWeights(format!("not a weight: {part:?}")))
        })
        .collect()
}

/// Mode of the integer-rounded scores. Ties go to the value seen first.
pub fn majority_vote(scores: &[f64]) -> f64 {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for score in scores {
        let value = score.round() as i64;
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let mut best: Option<(i64, usize)> = None;
    for (value, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((value, n));
        }
    }
    best.map_or(0.0, |(value, _)| value as f64)
}

/// Sample standard deviation (n − 1); 0 for fewer than two scores.
pub fn sample_std(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Merge one path's scores.
///
/// Weights apply positionally to `scores`. With fewer weights than scores,
/// or weights summing to zero, the plain average is used.
pub fn combine_scores(scores: &[f64], method: CombinationMethod, weights: Option<&[f64]>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    match method {
        CombinationMethod::Average => mean(scores),
        CombinationMethod::MajorityVote => majority_vote(scores),
        CombinationMethod::WeightedAverage => match weights {
            Some(weights) if weights.len() >= scores.len() => {
                let weights = &weights[..scores.len()];
                let total: f64 = weights.iter().sum();
                if total == 0.0 {
                    mean(scores)
                } else {
                    scores.iter().zip(weights).map(|(s, w)| s * w).sum::<f64>() / total
                }
            }
            _ => mean(scores),
        },
        CombinationMethod::Max => scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        CombinationMethod::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

/// Merge per-judge leaf maps path by path.
///
/// Every path seen by any judge is combined from the judges that have it.
pub fn combine_leaf_judgments(
    per_judge: &[JudgmentMap],
    method: CombinationMethod,
    weights: Option<&[f64]>,
) -> CombinedJudgmentMap {
    let paths: BTreeSet<_> = per_judge.iter().flat_map(|m| m.keys()).collect();
    let mut combined = BTreeMap::new();

    for path in paths {
        let found: Vec<&LeafJudgment> = per_judge.iter().filter_map(|m| m.get(path)).collect();
        let scores: Vec<f64> = found.iter().map(|j| f64::from(j.score)).collect();
        let mut tokens = TokenUsage::default();
        for judgment in &found {
            tokens += judgment.tokens;
        }
        let reasonings: Vec<&str> = found.iter().map(|j| j.reasoning.as_str()).collect();
        let evidences: Vec<&str> = found.iter().map(|j| j.evidence.as_str()).collect();

        combined.insert(
            path.clone(),
            CombinedLeafJudgment {
                score: combine_scores(&scores, method, weights),
                std: sample_std(&scores),
                reasoning: format!(
                    "Combined from {} LLMs ({method}): {}",
                    scores.len(),
                    reasonings.join(" | ")
                ),
                evidence: evidences.join(" | "),
                tokens,
                num_llms: scores.len(),
                individual_scores: scores,
                combination_method: method.to_string(),
            },
        );
    }
    combined
}

/// Provenance and headline numbers of a combined result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationMetadata {
    pub combination_method: CombinationMethod,
    pub num_evaluations_combined: usize,
    pub weights: Option<Vec<f64>>,
    pub confidence_threshold: f64,
    pub overall_score: f64,
    pub overall_std: f64,
    pub overall_score_range: [f64; 2],
    pub generated_at: DateTime<Utc>,
}

/// Combined scored tree as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedEvaluation {
    pub rubrics: Vec<ScoredNode<CombinedLeafJudgment>>,
    pub combination_metadata: CombinationMetadata,
}

/// Combine several judges' scored trees into one.
pub fn combine_evaluations(
    evaluations: &[Vec<ScoredNode<LeafJudgment>>],
    config: &CombineConfig,
) -> Result<CombinedEvaluation, DocscoreError> {
    if evaluations.len() < MIN_EVALUATIONS {
        return Err(DocscoreError::NotEnoughEvaluations {
            required: MIN_EVALUATIONS,
            found: evaluations.len(),
        });
    }
    if let Some(weights) = &config.weights {
        if weights.len() != evaluations.len() {
            tracing::warn!(
                weights = weights.len(),
                evaluations = evaluations.len(),
                "weight count does not match evaluation count"
            );
        }
    }

    let per_judge: Vec<JudgmentMap> = evaluations.iter().map(|e| leaf_evaluations(e)).collect();
    for (i, leaves) in per_judge.iter().enumerate() {
        tracing::debug!(judge = i, leaves = leaves.len(), "extracted leaf judgments");
    }
    let combined = combine_leaf_judgments(&per_judge, config.method, config.weights.as_deref());

    let shape = rubric_shape(&evaluations[0]);
    let propagation = propagate(&shape, &combined);
    let overall_score = propagation.overall_score();
    let overall_std = propagation.overall_std().unwrap_or(0.0);
    obs::emit_combine_finished(
        config.method.as_str(),
        evaluations.len(),
        overall_score,
        overall_std,
    );

    Ok(CombinedEvaluation {
        rubrics: propagation.nodes,
        combination_metadata: CombinationMetadata {
            combination_method: config.method,
            num_evaluations_combined: evaluations.len(),
            weights: config.weights.clone(),
            confidence_threshold: config.confidence_threshold,
            overall_score,
            overall_std,
            overall_score_range: [overall_score - overall_std, overall_score + overall_std],
            generated_at: Utc::now(),
        },
    })
}
