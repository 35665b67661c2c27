//! Batched leaf evaluation with failure recovery.
//!
//! The pass runs in two phases:
//!
//! 1. **Initial pass**: leaves are split into fixed-size batches. Every leaf
//!    in a batch is judged in its own tokio task; the pass waits for the
//!    whole batch, then sleeps a fixed delay before the next one. A
//!    rate-limited batch additionally pauses the pipeline for a cool-down.
//! 2. **Retry pass** (optional): starts only after the initial pass has
//!    fully resolved. Every degraded leaf is re-judged concurrently with a
//!    stricter prompt inside a bounded attempt loop.
//!
//! No single leaf can abort a run: parse failures fall back to a keyword
//! heuristic, invocation failures fail open with `score = 1`, and a task
//! that panics is converted the same way.

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::EvaluatorConfig;
use crate::domain::{
    DocTree, JudgmentMap, LeafJudgment, NodePath, Rubric, TokenUsage, TAG_EVALUATION_ERROR,
    TAG_FINAL_FALLBACK,
};
use crate::judge::parse::{excerpt, judgment_from_reply, keyword_verdict, parse_reply, ParsedReply};
use crate::judge::prompt::{build_evaluation_prompt, build_retry_prompt, SYSTEM_PROMPT};
use crate::judge::{JudgeClient, JudgeFailure};
use crate::leaves::{collect_leaves, LeafRequirement};
use crate::metrics::JudgeMetrics;
use crate::obs;
use crate::propagate::{propagate, Propagation};

/// Characters of the last reply kept as evidence after retries run out.
const FINAL_EVIDENCE_CHARS: usize = 200;

/// Result of one first-pass leaf task.
#[derive(Debug)]
struct LeafAttempt {
    path: NodePath,
    judgment: LeafJudgment,
    rate_limited: bool,
}

/// Result of the retry loop for one leaf.
#[derive(Debug)]
struct RetryAttempt {
    path: NodePath,
    judgment: LeafJudgment,
    recovered: bool,
}

/// Summary of a retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Degraded leaves that were re-judged.
    pub attempted: usize,
    /// Leaves that obtained a structurally valid reply.
    pub recovered: usize,
}

/// Judgments of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOutcome {
    pub judgments: JudgmentMap,
    pub retry: Option<RetryReport>,
}

/// A rubric scored by one judge.
#[derive(Debug, Clone)]
pub struct ScoredRun {
    pub outcome: EvaluationOutcome,
    pub propagation: Propagation<LeafJudgment>,
}

/// Drives a judge over a set of leaves.
pub struct Evaluator {
    client: Arc<dyn JudgeClient>,
    docs: Arc<DocTree>,
    config: EvaluatorConfig,
    metrics: Arc<JudgeMetrics>,
}

impl Evaluator {
    pub fn new(client: Arc<dyn JudgeClient>, docs: DocTree, config: EvaluatorConfig) -> Self {
        Self {
            client,
            docs: Arc::new(docs),
            config,
            metrics: Arc::new(JudgeMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &JudgeMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Judge every leaf of `rubric` and propagate the scores upwards.
    pub async fn score(&self, rubric: &Rubric) -> ScoredRun {
        let leaves = collect_leaves(rubric);
        let outcome = self.evaluate(&leaves).await;
        let propagation = propagate(rubric, &outcome.judgments);
        obs::emit_evaluation_finished(
            self.client.model_name(),
            leaves.len(),
            propagation.overall_score(),
        );
        ScoredRun {
            outcome,
            propagation,
        }
    }

    /// Judge every leaf, then run the retry pass when enabled.
    pub async fn evaluate(&self, leaves: &[LeafRequirement]) -> EvaluationOutcome {
        let mut judgments = self.initial_pass(leaves).await;
        let retry = if self.config.enable_retry {
            Some(self.retry_pass(leaves, &mut judgments).await)
        } else {
            None
        };
        self.metrics.flush();
        EvaluationOutcome { judgments, retry }
    }

    /// First attempt for every leaf, batch by batch.
    pub async fn initial_pass(&self, leaves: &[LeafRequirement]) -> JudgmentMap {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = leaves.len().div_ceil(batch_size);
        obs::emit_evaluation_started(self.client.model_name(), leaves.len(), total_batches);

        let mut judgments = JudgmentMap::new();
        for (batch_idx, batch) in leaves.chunks(batch_size).enumerate() {
            debug!(
                batch = batch_idx + 1,
                total = total_batches,
                size = batch.len(),
                "processing batch"
            );
            for leaf in batch {
                debug!(path = %leaf.path, requirement = %excerpt(&leaf.requirement, 100), "queued");
            }

            let handles: Vec<_> = batch
                .iter()
                .map(|leaf| {
                    tokio::spawn(judge_leaf(
                        Arc::clone(&self.client),
                        Arc::clone(&self.docs),
                        leaf.clone(),
                        Arc::clone(&self.metrics),
                    ))
                })
                .collect();

            let mut rate_limited = false;
            let mut degraded = 0;
            for (leaf, joined) in batch.iter().zip(join_all(handles).await) {
                let attempt = joined.unwrap_or_else(|e| {
                    warn!(path = %leaf.path, error = %e, "judge task aborted");
                    self.metrics.inc_degraded();
                    LeafAttempt {
                        path: leaf.path.clone(),
                        judgment: evaluation_error(&format!("judge task aborted: {e}")),
                        rate_limited: false,
                    }
                });
                rate_limited |= attempt.rate_limited;
                if attempt.judgment.needs_retry() {
                    degraded += 1;
                }
                judgments.insert(attempt.path, attempt.judgment);
            }
            obs::emit_batch_completed(batch_idx + 1, total_batches, batch.len(), degraded);

            if rate_limited {
                obs::emit_rate_limit_cooldown(self.config.rate_limit_cooldown.as_secs());
                sleep(self.config.rate_limit_cooldown).await;
            }
            if batch_idx + 1 < total_batches {
                sleep(self.config.batch_delay).await;
            }
        }
        judgments
    }

    /// Re-judge every degraded leaf, replacing its prior judgment.
    pub async fn retry_pass(
        &self,
        leaves: &[LeafRequirement],
        judgments: &mut JudgmentMap,
    ) -> RetryReport {
        let pending: Vec<(LeafRequirement, LeafJudgment)> = leaves
            .iter()
            .filter_map(|leaf| {
                judgments
                    .get(&leaf.path)
                    .filter(|j| j.needs_retry())
                    .map(|j| (leaf.clone(), j.clone()))
            })
            .collect();

        if pending.is_empty() {
            debug!("no degraded leaves to re-evaluate");
            obs::emit_retry_completed(0, 0);
            return RetryReport::default();
        }

        let handles: Vec<_> = pending
            .into_iter()
            .map(|(leaf, previous)| {
                self.metrics.inc_retried();
                tokio::spawn(retry_leaf(
                    Arc::clone(&self.client),
                    Arc::clone(&self.docs),
                    leaf,
                    previous,
                    self.config.clone(),
                    Arc::clone(&self.metrics),
                ))
            })
            .collect();

        let mut report = RetryReport {
            attempted: handles.len(),
            recovered: 0,
        };
        for joined in join_all(handles).await {
            match joined {
                Ok(attempt) => {
                    if attempt.recovered {
                        report.recovered += 1;
                    }
                    judgments.insert(attempt.path, attempt.judgment);
                }
                Err(e) => warn!(error = %e, "retry task aborted; keeping prior judgment"),
            }
        }
        obs::emit_retry_completed(report.attempted, report.recovered);
        report
    }
}

async fn judge_leaf(
    client: Arc<dyn JudgeClient>,
    docs: Arc<DocTree>,
    leaf: LeafRequirement,
    metrics: Arc<JudgeMetrics>,
) -> LeafAttempt {
    let prompt = build_evaluation_prompt(&leaf.requirement, &docs);
    match client.complete(SYSTEM_PROMPT, &prompt).await {
        Ok(reply) => {
            metrics.record_call(reply.tokens);
            let judgment = judgment_from_reply(&reply);
            if judgment.needs_retry() {
                metrics.inc_degraded();
                obs::emit_leaf_degraded(&leaf.path.to_string(), &judgment.reasoning);
            }
            LeafAttempt {
                path: leaf.path,
                judgment,
                rate_limited: false,
            }
        }
        Err(failure) => {
            metrics.record_call(TokenUsage::default());
            metrics.inc_degraded();
            let rate_limited = failure.is_rate_limited();
            if rate_limited {
                metrics.inc_rate_limited();
            }
            obs::emit_leaf_degraded(&leaf.path.to_string(), &failure.to_string());
            LeafAttempt {
                path: leaf.path,
                judgment: evaluation_error(&failure.to_string()),
                rate_limited,
            }
        }
    }
}

/// Fail-open judgment for a judge call that produced nothing.
fn evaluation_error(message: &str) -> LeafJudgment {
    LeafJudgment::new(
        1,
        format!("{TAG_EVALUATION_ERROR}: {message}"),
        format!("Full error: {message}"),
        TokenUsage::default(),
    )
}

async fn retry_leaf(
    client: Arc<dyn JudgeClient>,
    docs: Arc<DocTree>,
    leaf: LeafRequirement,
    previous: LeafJudgment,
    config: EvaluatorConfig,
    metrics: Arc<JudgeMetrics>,
) -> RetryAttempt {
    let prompt = build_retry_prompt(&leaf.requirement, &docs, &previous);
    let max_attempts = config.max_retries.saturating_add(1);
    let mut tokens = TokenUsage::default();
    let mut last: Option<Result<String, JudgeFailure>> = None;

    for attempt in 1..=max_attempts {
        match client.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => {
                metrics.record_call(reply.tokens);
                tokens += reply.tokens;
                if let ParsedReply::Valid {
                    score,
                    reasoning,
                    evidence,
                } = parse_reply(&reply.text)
                {
                    let mut judgment = LeafJudgment::new(score, reasoning, evidence, tokens);
                    judgment.retry_count = Some(attempt);
                    return RetryAttempt {
                        path: leaf.path,
                        judgment,
                        recovered: true,
                    };
                }
                debug!(path = %leaf.path, attempt, "retry reply still unparseable");
                last = Some(Ok(reply.text));
            }
            Err(failure) => {
                metrics.record_call(TokenUsage::default());
                if failure.is_rate_limited() {
                    metrics.inc_rate_limited();
                }
                debug!(path = %leaf.path, attempt, error = %failure, "retry call failed");
                last = Some(Err(failure));
            }
        }
        if attempt < max_attempts {
            sleep(config.retry_backoff).await;
        }
    }

    warn!(path = %leaf.path, attempts = max_attempts, "retries exhausted");
    let mut judgment = match last {
        Some(Ok(text)) => LeafJudgment::new(
            keyword_verdict(&text),
            format!("{TAG_FINAL_FALLBACK} text analysis after {max_attempts} attempts"),
            excerpt(&text, FINAL_EVIDENCE_CHARS),
            tokens,
        ),
        Some(Err(failure)) => LeafJudgment::new(
            0,
            format!("{TAG_FINAL_FALLBACK} evaluation error after {max_attempts} attempts: {failure}"),
            String::new(),
            tokens,
        ),
        None => LeafJudgment::new(
            0,
            format!("{TAG_FINAL_FALLBACK} no attempts made"),
            String::new(),
            tokens,
        ),
    };
    judgment.retry_count = Some(max_attempts);
    RetryAttempt {
        path: leaf.path,
        judgment,
        recovered: false,
    }
}
