//! Runtime configuration.
//!
//! Defaults mirror what a local LiteLLM-style proxy expects; every value can
//! be overridden from the environment or the CLI.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:4000/";
pub const DEFAULT_API_KEY: &str = "sk-1234";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4";

/// Where and how to reach the judge model.
///
/// `Default` reads `BASE_URL`, `API_KEY` and `MODEL` from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeEndpoint {
    /// OpenAI-compatible API root.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for JudgeEndpoint {
    fn default() -> Self {
        Self {
            base_url: std::env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("API_KEY").unwrap_or_else(|_| DEFAULT_API_KEY.to_string()),
            model: std::env::var("MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl JudgeEndpoint {
    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Batching and recovery knobs for one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Leaves judged concurrently per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Run the retry pass over degraded leaves.
    pub enable_retry: bool,
    /// Extra attempts per degraded leaf in the retry pass.
    pub max_retries: u32,
    /// Pause between retry attempts of one leaf.
    pub retry_backoff: Duration,
    /// Whole-pipeline pause after a rate-limited batch.
    pub rate_limit_cooldown: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_secs(1),
            enable_retry: false,
            max_retries: 2,
            retry_backoff: Duration::from_secs(2),
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }
}

impl EvaluatorConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, enable: bool, max_retries: u32) -> Self {
        self.enable_retry = enable;
        self.max_retries = max_retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_handles_trailing_slash() {
        let endpoint = JudgeEndpoint {
            base_url: "http://localhost:4000/".to_string(),
            ..JudgeEndpoint::default()
        };
        assert_eq!(
            endpoint.completions_url(),
            "http://localhost:4000/chat/completions"
        );
    }

    #[test]
    fn evaluator_defaults() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.batch_size, 5);
        assert!(!config.enable_retry);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn batch_size_never_drops_to_zero() {
        assert_eq!(EvaluatorConfig::default().with_batch_size(0).batch_size, 1);
    }
}
