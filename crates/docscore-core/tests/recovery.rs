//! Failure handling of the evaluation pass: fail-open, cool-down, retries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docscore_core::domain::{
    TAG_EVALUATION_ERROR, TAG_FINAL_FALLBACK, TAG_PARSING_ERROR, TAG_PARSING_FALLBACK,
};
use docscore_core::fakes::ScriptedJudge;
use docscore_core::summary::estimate_cost;
use docscore_core::{
    DocTree, Evaluator, EvaluatorConfig, JudgeClient, JudgeFailure, JudgeReply, NodePath, Rubric,
    RunSummary, TokenUsage,
};
use serde_json::json;
use tokio::time::Instant;

fn rubric(n: usize) -> Rubric {
    let nodes: Vec<_> = (0..n)
        .map(|i| json!({"requirements": format!("req-{i}"), "weight": 1}))
        .collect();
    Rubric::from_value(&json!(nodes)).unwrap()
}

fn evaluator(judge: ScriptedJudge, config: EvaluatorConfig) -> Evaluator {
    Evaluator::new(Arc::new(judge), DocTree::new(json!({"title": "docs"})), config)
}

/// Paused-clock elapsed time, allowing for timer tick rounding.
fn assert_elapsed(start: Instant, secs: u64) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs + 1),
        "expected ~{secs}s, got {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn invocation_failure_fails_open_without_aborting() {
    let judge = ScriptedJudge::new("flaky")
        .fail("req-0", JudgeFailure::Transport("connection reset".into()))
        .verdict("req-1", 0)
        .verdict("req-2", 1);
    let ev = evaluator(judge, EvaluatorConfig::default());

    let run = ev.score(&rubric(3)).await;
    let failed = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert_eq!(failed.score, 1);
    assert!(failed.reasoning.starts_with(TAG_EVALUATION_ERROR));
    assert!(failed.evidence.starts_with("Full error: "));
    assert_eq!(run.outcome.judgments.len(), 3);
    assert!((run.propagation.overall_score() - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn batches_are_spaced_by_the_fixed_delay() {
    let judge = ScriptedJudge::new("steady").otherwise(Ok(JudgeReply::new(
        r#"{"score": 1, "reasoning": "ok", "evidence": "e"}"#,
    )));
    let ev = evaluator(judge, EvaluatorConfig::default().with_batch_size(2));

    let start = Instant::now();
    ev.score(&rubric(5)).await;
    // three batches, two gaps
    assert_elapsed(start, 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_message_triggers_cooldown() {
    let judge = ScriptedJudge::new("busy")
        .fail(
            "req-0",
            JudgeFailure::Transport("Rate limit reached for requests".into()),
        )
        .verdict("req-1", 1);
    let ev = evaluator(judge, EvaluatorConfig::default().with_batch_size(1));

    let start = Instant::now();
    ev.score(&rubric(2)).await;
    assert_elapsed(start, 61);
    assert_eq!(ev.metrics().rate_limited_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_pass_recovers_and_counts_attempts() {
    let judge = ScriptedJudge::new("recovering")
        .reply("req-0", r#"{"score": 7, "reasoning": "odd"}"#)
        .reply("req-0", "still not json")
        .verdict("req-0", 1)
        .verdict("req-1", 0);
    let ev = evaluator(judge, EvaluatorConfig::default().with_retry(true, 2));

    let run = ev.score(&rubric(2)).await;
    let recovered = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert_eq!(recovered.score, 1);
    assert_eq!(recovered.retry_count, Some(2));
    assert!(!recovered.needs_retry());

    let report = run.outcome.retry.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.recovered, 1);

    let summary = RunSummary::from_judgments(
        "recovering",
        &run.outcome.judgments,
        ev.metrics().tokens(),
        0.5,
    );
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.errored, 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_score_is_tagged_and_left_alone_without_retry() {
    let judge = ScriptedJudge::new("strict").reply("req-0", r#"{"score": "yes"}"#);
    let ev = evaluator(judge, EvaluatorConfig::default());

    let run = ev.score(&rubric(1)).await;
    let judgment = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert_eq!(judgment.score, 0);
    assert!(judgment.reasoning.starts_with(TAG_PARSING_ERROR));
    assert!(run.outcome.retry.is_none());
}

#[tokio::test(start_paused = true)]
async fn retry_loop_is_bounded_and_backs_off() {
    let judge = Arc::new(
        ScriptedJudge::new("hopeless")
            .fail("req-0", JudgeFailure::EmptyReply)
            .otherwise(Err(JudgeFailure::EmptyReply)),
    );
    let ev = Evaluator::new(
        judge.clone(),
        DocTree::new(json!({})),
        EvaluatorConfig::default().with_retry(true, 3),
    );

    let start = Instant::now();
    let run = ev.score(&rubric(1)).await;
    // 4 attempts, 3 backoffs of 2s
    assert_elapsed(start, 6);
    assert_eq!(judge.calls_for("req-0"), 5);

    let judgment = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert_eq!(judgment.score, 0);
    assert_eq!(judgment.retry_count, Some(4));
    assert!(judgment.reasoning.starts_with(TAG_FINAL_FALLBACK));
    assert_eq!(run.outcome.retry.unwrap().recovered, 0);
}

#[tokio::test(start_paused = true)]
async fn summary_counts_tokens_of_replaced_attempts() {
    let judge = ScriptedJudge::new("costly")
        .reply_costing("req-0", "no verdict here", TokenUsage::new(500, 50))
        .reply_costing(
            "req-0",
            r#"{"score": 1, "reasoning": "found", "evidence": "README"}"#,
            TokenUsage::new(100, 10),
        );
    let ev = evaluator(judge, EvaluatorConfig::default().with_retry(true, 2));

    let run = ev.score(&rubric(1)).await;
    let judgment = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert_eq!(judgment.tokens, TokenUsage::new(100, 10));

    let summary = RunSummary::from_judgments(
        "costly",
        &run.outcome.judgments,
        ev.metrics().tokens(),
        run.propagation.overall_score(),
    );
    assert_eq!(summary.tokens, TokenUsage::new(600, 60));
    let expected = estimate_cost(TokenUsage::new(600, 60));
    assert!((summary.estimated_cost_usd - expected).abs() < 1e-12);
    assert!(summary.render().contains("Total tokens used: 660"));
}

/// Delegates to a scripted judge, but crashes once `requirement` has been
/// asked `calls_before_crash` times.
struct CrashingJudge {
    inner: ScriptedJudge,
    requirement: &'static str,
    calls_before_crash: usize,
    calls: AtomicUsize,
}

impl CrashingJudge {
    fn new(inner: ScriptedJudge, requirement: &'static str, calls_before_crash: usize) -> Self {
        Self {
            inner,
            requirement,
            calls_before_crash,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JudgeClient for CrashingJudge {
    async fn complete(&self, system: &str, prompt: &str) -> Result<JudgeReply, JudgeFailure> {
        if prompt.contains(&format!("Criteria: \"{}\"", self.requirement))
            && self.calls.fetch_add(1, Ordering::SeqCst) >= self.calls_before_crash
        {
            panic!("judge crashed on {}", self.requirement);
        }
        self.inner.complete(system, prompt).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[tokio::test(start_paused = true)]
async fn crashed_leaf_task_fails_open_and_spares_siblings() {
    let inner = ScriptedJudge::new("crashy")
        .verdict("req-0", 0)
        .verdict("req-2", 1);
    let judge = CrashingJudge::new(inner, "req-1", 0);
    let ev = Evaluator::new(
        Arc::new(judge),
        DocTree::new(json!({"title": "docs"})),
        EvaluatorConfig::default(),
    );

    let run = ev.score(&rubric(3)).await;
    assert_eq!(run.outcome.judgments.len(), 3);
    assert_eq!(run.outcome.judgments[&NodePath::from(vec![0])].score, 0);
    assert_eq!(run.outcome.judgments[&NodePath::from(vec![2])].score, 1);

    let crashed = &run.outcome.judgments[&NodePath::from(vec![1])];
    assert_eq!(crashed.score, 1);
    assert!(crashed.reasoning.starts_with(TAG_EVALUATION_ERROR));
    assert_eq!(ev.metrics().degraded_leaves(), 1);
}

#[tokio::test(start_paused = true)]
async fn crash_during_retry_keeps_prior_judgment() {
    let inner = ScriptedJudge::new("crashy")
        .reply("req-0", "nothing structured")
        .verdict("req-1", 1);
    let judge = CrashingJudge::new(inner, "req-0", 1);
    let ev = Evaluator::new(
        Arc::new(judge),
        DocTree::new(json!({"title": "docs"})),
        EvaluatorConfig::default().with_retry(true, 2),
    );

    let run = ev.score(&rubric(2)).await;
    let kept = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert!(kept.reasoning.starts_with(TAG_PARSING_FALLBACK));
    assert_eq!(kept.retry_count, None);
    assert_eq!(run.outcome.judgments[&NodePath::from(vec![1])].score, 1);

    let report = run.outcome.retry.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.recovered, 0);
}

#[tokio::test(start_paused = true)]
async fn huge_retry_budget_does_not_overflow_attempt_count() {
    let judge = ScriptedJudge::new("patient")
        .reply("req-0", "nothing structured")
        .verdict("req-0", 1);
    let ev = evaluator(judge, EvaluatorConfig::default().with_retry(true, u32::MAX));

    let run = ev.score(&rubric(1)).await;
    let judgment = &run.outcome.judgments[&NodePath::from(vec![0])];
    assert_eq!(judgment.score, 1);
    assert_eq!(judgment.retry_count, Some(1));
    assert_eq!(run.outcome.retry.unwrap().recovered, 1);
}
