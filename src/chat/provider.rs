//! Chat-completion provider seam.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChatConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("AI API key not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned an empty reply")]
    EmptyReply,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn generate_reply(&self, system_prompt: &str, message: &str)
        -> Result<String, ProviderError>;
}

/// OpenAI-compatible `chat/completions` client.
#[derive(Clone)]
pub struct HttpChatProvider {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpChatProvider {
    pub fn new(config: &ChatConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build chat http client")?;
        Ok(Self {
            http,
            url: config.api_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

// First non-blank choice content.
fn first_reply(resp: CompletionResponse) -> Option<String> {
    resp.choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .find(|c| !c.trim().is_empty())
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    async fn generate_reply(
        &self,
        system_prompt: &str,
        message: &str,
    ) -> Result<String, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured)?;
        let body = CompletionRequest {
            model: &self.model,
            messages: [
                WireMessage { role: "system", content: system_prompt },
                WireMessage { role: "user", content: message },
            ],
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "chat provider error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let reply = first_reply(completion).ok_or(ProviderError::EmptyReply)?;
        debug!(model = %self.model, chars = reply.len(), "chat reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_is_first_non_blank_choice() {
        let resp: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"  "}},{"message":{"content":"Hi there"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_reply(resp).as_deref(), Some("Hi there"));

        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_reply(resp).is_none());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let provider = HttpChatProvider::new(&ChatConfig {
            api_key: None,
            api_url: "http://127.0.0.1:9/unused".into(),
            model: "m".into(),
            timeout_secs: 1,
        })
        .unwrap();
        let err = provider.generate_reply("sys", "hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
        assert_eq!(err.to_string(), "AI API key not configured");
    }
}
