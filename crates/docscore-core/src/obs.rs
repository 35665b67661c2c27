//! Structured observability hooks for evaluation lifecycle events.
//!
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for the key events of a judging run and a
//!   combination
//!
//! Events are emitted at `info!` level unless noted; filter with
//! `DOCSCORE_LOG`.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // every event below is tagged with run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("docscore.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: evaluation started for a judge model.
pub fn emit_evaluation_started(model: &str, leaves: usize, batches: usize) {
    info!(
        event = "evaluation.started",
        model = %model,
        leaves = leaves,
        batches = batches,
    );
}

/// Emit event: one batch of leaves resolved.
pub fn emit_batch_completed(batch: usize, total: usize, size: usize, degraded: usize) {
    info!(
        event = "batch.completed",
        batch = batch,
        total = total,
        size = size,
        degraded = degraded,
    );
}

/// Emit event: a leaf judgment was degraded (warning level).
pub fn emit_leaf_degraded(path: &str, reason: &str) {
    warn!(event = "leaf.degraded", path = %path, reason = %reason);
}

/// Emit event: the pipeline pauses after a rate-limited batch (warning level).
pub fn emit_rate_limit_cooldown(seconds: u64) {
    warn!(event = "rate_limit.cooldown", seconds = seconds);
}

/// Emit event: retry pass finished.
pub fn emit_retry_completed(attempted: usize, recovered: usize) {
    info!(
        event = "retry.completed",
        attempted = attempted,
        recovered = recovered,
    );
}

/// Emit event: evaluation finished with its overall score.
pub fn emit_evaluation_finished(model: &str, leaves: usize, overall_score: f64) {
    info!(
        event = "evaluation.finished",
        model = %model,
        leaves = leaves,
        overall_score = overall_score,
    );
}

/// Emit event: a leaf had no judgment at propagation time (warning level).
pub fn emit_structural_gap(path: &str) {
    warn!(event = "propagate.gap", path = %path, "no evaluation found for leaf");
}

/// Emit event: evaluations were combined.
pub fn emit_combine_finished(method: &str, judges: usize, overall_score: f64, overall_std: f64) {
    info!(
        event = "combine.finished",
        method = %method,
        judges = judges,
        overall_score = overall_score,
        overall_std = overall_std,
    );
}
