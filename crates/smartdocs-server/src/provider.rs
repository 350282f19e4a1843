//! Completion provider
//!
//! The model is an opaque collaborator: it gets a system prompt and one user
//! message, and returns text. [`AnthropicProvider`] talks to the Messages
//! API; tests substitute their own [`CompletionProvider`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Maximum tokens for one completion; the reply carries the whole document.
const DEFAULT_MAX_TOKENS: u32 = 8192;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send `user_message` under `system` and return the raw reply text.
    async fn complete(&self, system: &str, user_message: &str) -> Result<String>;
}

/// The user turn: instruction plus the current document.
pub fn user_message(prompt: &str, content: &str) -> String {
    format!("Instruction:\n{prompt}\n\nCurrent document HTML:\n{content}")
}

/// Lightweight client for the Anthropic Messages API
pub struct AnthropicProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(
        api_base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Server(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", api_base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Build from config; `None` when no API key is configured.
    pub fn from_config(config: &ServerConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(None);
        };
        Self::new(
            &config.api_base_url,
            api_key,
            config.model.clone(),
            config.request_timeout(),
        )
        .map(Some)
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, system: &str, user_message: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: Some(system),
            messages: vec![Message {
                role: "user",
                content: user_message,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("API error ({status}): {error_text}")));
        }

        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("unreadable response: {e}")))?;

        Ok(result.text())
    }
}

/// Used when no API key is configured; every request fails upstream.
pub struct UnconfiguredProvider;

#[async_trait]
impl CompletionProvider for UnconfiguredProvider {
    async fn complete(&self, _system: &str, _user_message: &str) -> Result<String> {
        Err(Error::Upstream("no API key configured".to_string()))
    }
}

// API types

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_carries_prompt_and_document() {
        let message = user_message("shorten it", "<p>long</p>");
        assert!(message.starts_with("Instruction:\nshorten it"));
        assert!(message.ends_with("<p>long</p>"));
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "<p>a</p>\n"},
                {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                {"type": "text", "text": "---USER_MESSAGE---\nok"}
            ]
        }))
        .unwrap();
        assert_eq!(response.text(), "<p>a</p>\n---USER_MESSAGE---\nok");
    }

    #[test]
    fn test_no_key_means_no_provider() {
        let config = ServerConfig::default();
        assert!(AnthropicProvider::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let provider = AnthropicProvider::new(
            "https://example.test/",
            "k",
            "m",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(provider.endpoint, "https://example.test/v1/messages");
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_upstream() {
        let err = UnconfiguredProvider.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
