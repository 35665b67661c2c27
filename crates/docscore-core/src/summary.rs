//! End-of-run summaries printed by the CLI.

use serde::Serialize;

use crate::combine::CombinedEvaluation;
use crate::domain::{JudgmentMap, TokenUsage};

/// USD per million input tokens.
pub const INPUT_COST_PER_MILLION: f64 = 3.0;
/// USD per million output tokens.
pub const OUTPUT_COST_PER_MILLION: f64 = 15.0;

const RULE: &str = "----------------------------------------------------------------------------------------------------";

/// Estimated spend for `tokens`.
pub fn estimate_cost(tokens: TokenUsage) -> f64 {
    tokens.input as f64 * INPUT_COST_PER_MILLION / 1e6
        + tokens.output as f64 * OUTPUT_COST_PER_MILLION / 1e6
}

/// Totals for one judge's evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub model: String,
    pub leaves_evaluated: usize,
    /// Leaves that went through the retry pass.
    pub retried: usize,
    /// Leaves whose final reasoning reports an error or failure.
    pub errored: usize,
    /// Every judge call of the run, including attempts a retry replaced.
    pub tokens: TokenUsage,
    pub estimated_cost_usd: f64,
    pub overall_score: f64,
}

impl RunSummary {
    /// `tokens` is the run's cumulative usage, replaced attempts included.
    pub fn from_judgments(
        model: &str,
        judgments: &JudgmentMap,
        tokens: TokenUsage,
        overall_score: f64,
    ) -> Self {
        Self {
            model: model.to_string(),
            leaves_evaluated: judgments.len(),
            retried: judgments
                .values()
                .filter(|j| j.retry_count.unwrap_or(0) > 0)
                .count(),
            errored: judgments.values().filter(|j| j.is_error()).count(),
            tokens,
            estimated_cost_usd: estimate_cost(tokens),
            overall_score,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(RULE);
        out.push('\n');
        out.push_str("EVALUATION SUMMARY:\n");
        out.push_str(&format!("Judge model: {}\n", self.model));
        out.push_str(&format!(
            "Total leaf requirements evaluated: {}\n",
            self.leaves_evaluated
        ));
        out.push_str(&format!("Requirements that needed retry: {}\n", self.retried));
        out.push_str(&format!("Requirements with final errors: {}\n", self.errored));
        out.push_str(&format!("Total tokens used: {}\n", self.tokens.total()));
        out.push_str(&format!("Total cost: ${:.4}\n", self.estimated_cost_usd));
        out.push_str(&format!(
            "Overall documentation score: {:.4}\n",
            self.overall_score
        ));
        out.push_str(RULE);
        out.push('\n');
        out
    }
}

/// Headline block for a combined result.
pub fn render_combination_summary(combined: &CombinedEvaluation) -> String {
    let meta = &combined.combination_metadata;
    let [low, high] = meta.overall_score_range;
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str("COMBINATION SUMMARY:\n");
    out.push_str(&format!("Method used: {}\n", meta.combination_method));
    out.push_str(&format!(
        "Number of evaluations combined: {}\n",
        meta.num_evaluations_combined
    ));
    out.push_str(&format!(
        "Overall combined score: {:.4} ± {:.4}\n",
        meta.overall_score, meta.overall_std
    ));
    out.push_str(&format!("Overall score range: [{low:.4}, {high:.4}]\n"));
    out.push_str(RULE);
    out.push('\n');
    out
}
