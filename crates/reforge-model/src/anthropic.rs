// HTTP backend for the Anthropic Messages API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{LanguageModel, ModelConfig, ModelError, ModelKind, ModelOutput};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Environment variable consulted when no key is configured explicitly
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

pub struct AnthropicModel {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicModel {
    pub fn new(api_key: String) -> Result<Self, ModelError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ModelError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
        })
    }

    /// Build a client from `ANTHROPIC_API_KEY`
    pub fn from_env() -> Result<Self, ModelError> {
        let key = std::env::var(API_KEY_ENV)
            .map_err(|_| ModelError::ConfigError(format!("{} is not set", API_KEY_ENV)))?;
        Self::new(key)
    }

    /// Point the client at a different endpoint (proxies, gateways)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn build_request<'a>(prompt: &'a str, config: &'a ModelConfig) -> MessageRequest<'a> {
        MessageRequest {
            model: config.model.as_deref().unwrap_or(DEFAULT_MODEL),
            max_tokens: config.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        "Anthropic API"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Anthropic
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(
        &self,
        prompt: &str,
        config: &ModelConfig,
    ) -> Result<ModelOutput, ModelError> {
        let start = Instant::now();
        let request = Self::build_request(prompt, config);

        debug!(
            model = request.model,
            prompt_len = prompt.len(),
            "Sending request to Anthropic API"
        );

        let mut builder = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request);

        if let Some(limit) = config.timeout {
            builder = builder.timeout(limit);
        }

        let response = builder.send().await.map_err(|e| match config.timeout {
            Some(limit) if e.is_timeout() => ModelError::Timeout(limit),
            _ => ModelError::from(e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(format!("Invalid API payload: {}", e)))?;

        let text = message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            stop_reason = message.stop_reason.as_deref().unwrap_or("unknown"),
            text_len = text.len(),
            "Received response"
        );

        Ok(ModelOutput::new(text, String::new(), 0, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let model = AnthropicModel::new("test-key".to_string());
        assert!(model.is_ok());
    }

    #[test]
    fn test_request_uses_configured_model() {
        let config = ModelConfig::default()
            .with_model("claude-opus-4".into())
            .with_max_tokens(2048);
        let request = AnthropicModel::build_request("Hello", &config);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-opus-4");
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
    }

    #[test]
    fn test_response_ignores_non_text_blocks() {
        let payload = r#"{
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "second"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let response: MessageResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.content.len(), 3);
        assert!(matches!(response.content[1], ContentBlock::Other));
    }
}
