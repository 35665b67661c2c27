//! Atomic counters for a judging run.
//!
//! Counters are incremented silently from concurrent judge tasks. Call
//! [`JudgeMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a pass).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::TokenUsage;

/// Lightweight atomic counters without locking.
#[derive(Debug, Default)]
pub struct JudgeMetrics {
    judge_calls: AtomicU64,
    degraded_leaves: AtomicU64,
    retried_leaves: AtomicU64,
    rate_limited_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl JudgeMetrics {
    pub const fn new() -> Self {
        Self {
            judge_calls: AtomicU64::new(0),
            degraded_leaves: AtomicU64::new(0),
            retried_leaves: AtomicU64::new(0),
            rate_limited_calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// Record one judge call and the tokens it consumed.
    pub fn record_call(&self, tokens: TokenUsage) {
        self.judge_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens.fetch_add(tokens.input, Ordering::Relaxed);
        self.output_tokens.fetch_add(tokens.output, Ordering::Relaxed);
        tracing::trace!(metric = "judge_calls", "counter incremented");
    }

    pub fn inc_degraded(&self) {
        self.degraded_leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retried(&self) {
        self.retried_leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn judge_calls(&self) -> u64 {
        self.judge_calls.load(Ordering::Relaxed)
    }

    pub fn degraded_leaves(&self) -> u64 {
        self.degraded_leaves.load(Ordering::Relaxed)
    }

    pub fn retried_leaves(&self) -> u64 {
        self.retried_leaves.load(Ordering::Relaxed)
    }

    pub fn rate_limited_calls(&self) -> u64 {
        self.rate_limited_calls.load(Ordering::Relaxed)
    }

    pub fn tokens(&self) -> TokenUsage {
        TokenUsage::new(
            self.input_tokens.load(Ordering::Relaxed),
            self.output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let tokens = self.tokens();
        tracing::info!(
            metric = "flush",
            judge_calls = self.judge_calls(),
            degraded_leaves = self.degraded_leaves(),
            retried_leaves = self.retried_leaves(),
            rate_limited_calls = self.rate_limited_calls(),
            input_tokens = tokens.input,
            output_tokens = tokens.output,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = JudgeMetrics::new();
        assert_eq!(m.judge_calls(), 0);
        assert_eq!(m.tokens(), TokenUsage::default());
    }

    #[test]
    fn record_call_accumulates_tokens() {
        let m = JudgeMetrics::new();
        m.record_call(TokenUsage::new(100, 20));
        m.record_call(TokenUsage::new(50, 5));
        assert_eq!(m.judge_calls(), 2);
        assert_eq!(m.tokens(), TokenUsage::new(150, 25));
    }

    #[test]
    fn flush_does_not_reset() {
        let m = JudgeMetrics::new();
        m.inc_degraded();
        m.inc_retried();
        m.inc_rate_limited();
        m.flush();
        assert_eq!(m.degraded_leaves(), 1);
        assert_eq!(m.retried_leaves(), 1);
        assert_eq!(m.rate_limited_calls(), 1);
    }
}
