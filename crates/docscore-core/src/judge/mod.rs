//! Judge invocation boundary.
//!
//! The core never talks to a model directly. It builds prompts, hands them
//! to a [`JudgeClient`], and classifies whatever text comes back. Anything
//! slow, flaky or vendor-specific lives behind the trait.
//!
//! - [`prompt`]: system prompt and per-leaf prompt builders
//! - [`parse`]: reply extraction, classification and keyword fallback
//! - [`http`]: OpenAI-compatible chat-completions client

pub mod http;
pub mod parse;
pub mod prompt;

use async_trait::async_trait;

use crate::domain::TokenUsage;

/// Raw text returned by a judge together with its token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeReply {
    pub text: String,
    pub tokens: TokenUsage,
}

impl JudgeReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: TokenUsage::default(),
        }
    }

    pub fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = tokens;
        self
    }
}

/// A judge call that produced no usable reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeFailure {
    #[error("judge endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("judge transport error: {0}")]
    Transport(String),

    #[error("judge returned an empty reply")]
    EmptyReply,
}

impl JudgeFailure {
    /// HTTP 429, or any failure whose message mentions a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status { status: 429, .. })
            || self.to_string().to_lowercase().contains("rate limit")
    }
}

impl From<reqwest::Error> for JudgeFailure {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => JudgeFailure::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => JudgeFailure::Transport(err.to_string()),
        }
    }
}

/// An external evaluator able to answer a judging prompt.
///
/// Implementations may be slow and are called concurrently; they must not
/// assume any ordering between calls.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<JudgeReply, JudgeFailure>;

    /// Name used in logs and output file names.
    fn model_name(&self) -> &str;
}
