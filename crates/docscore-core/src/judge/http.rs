//! OpenAI-compatible chat-completions judge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::JudgeEndpoint;
use crate::domain::TokenUsage;
use crate::judge::{JudgeClient, JudgeFailure, JudgeReply};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Judge backed by an HTTP chat-completions endpoint.
pub struct HttpJudge {
    endpoint: JudgeEndpoint,
    http_client: reqwest::Client,
}

impl HttpJudge {
    pub fn new(endpoint: JudgeEndpoint) -> Result<Self, JudgeFailure> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("docscore/", env!("CARGO_PKG_VERSION")))
            .timeout(endpoint.request_timeout)
            .build()?;
        Ok(Self {
            endpoint,
            http_client,
        })
    }
}

#[async_trait]
impl JudgeClient for HttpJudge {
    async fn complete(&self, system: &str, prompt: &str) -> Result<JudgeReply, JudgeFailure> {
        let request = ChatRequest {
            model: &self.endpoint.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .http_client
            .post(self.endpoint.completions_url())
            .bearer_auth(&self.endpoint.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let tokens = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(JudgeFailure::EmptyReply)?;

        debug!(model = %self.endpoint.model, tokens = tokens.total(), "judge reply received");
        Ok(JudgeReply { text, tokens })
    }

    fn model_name(&self) -> &str {
        &self.endpoint.model
    }
}
