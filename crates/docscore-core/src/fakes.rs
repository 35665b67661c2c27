//! In-memory judge fake (testing only)
//!
//! `ScriptedJudge` answers prompts from per-requirement queues so pipeline
//! behaviour can be exercised without a model endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::TokenUsage;
use crate::judge::{JudgeClient, JudgeFailure, JudgeReply};

pub type Scripted = Result<JudgeReply, JudgeFailure>;

/// Judge that replays queued replies for each requirement.
///
/// A requirement is matched when the prompt contains `Criteria: "<requirement>"`.
/// Once a queue is drained the fallback reply is used; without one the call
/// fails with [`JudgeFailure::EmptyReply`].
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    model: String,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallback: Option<Scripted>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedJudge {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// Queue a text reply for `requirement`.
    pub fn reply(self, requirement: &str, text: &str) -> Self {
        self.push(requirement, Ok(JudgeReply::new(text)))
    }

    /// Queue a text reply that reports `tokens` of usage.
    pub fn reply_costing(self, requirement: &str, text: &str, tokens: TokenUsage) -> Self {
        self.push(requirement, Ok(JudgeReply::new(text).with_tokens(tokens)))
    }

    /// Queue a failure for `requirement`.
    pub fn fail(self, requirement: &str, failure: JudgeFailure) -> Self {
        self.push(requirement, Err(failure))
    }

    /// Queue a verdict as a well-formed JSON reply.
    pub fn verdict(self, requirement: &str, score: u8) -> Self {
        let text = format!(
            r#"{{"criteria": "{requirement}", "score": {score}, "reasoning": "scripted", "evidence": "fixture"}}"#
        );
        self.reply(requirement, &text)
    }

    /// Reply used for requirements with no queued entries left.
    pub fn otherwise(mut self, reply: Scripted) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Number of calls made for `requirement`.
    pub fn calls_for(&self, requirement: &str) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.get(requirement).copied().unwrap_or(0)
    }

    fn push(self, requirement: &str, entry: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(requirement.to_string())
            .or_default()
            .push_back(entry);
        self
    }

    fn matching_requirement(&self, prompt: &str) -> Option<String> {
        let scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts
            .keys()
            .filter(|req| prompt.contains(&format!("Criteria: \"{req}\"")))
            .max_by_key(|req| req.len())
            .cloned()
    }
}

#[async_trait]
impl JudgeClient for ScriptedJudge {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<JudgeReply, JudgeFailure> {
        let requirement = self.matching_requirement(prompt);
        if let Some(req) = &requirement {
            *self
                .calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(req.clone())
                .or_default() += 1;
            let next = self
                .scripts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(req)
                .and_then(VecDeque::pop_front);
            if let Some(entry) = next {
                return entry;
            }
        }
        self.fallback.clone().unwrap_or(Err(JudgeFailure::EmptyReply))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
