use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::ModelOutput;

/// Errors that can occur while talking to a language model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to spawn model process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model backend not found: {0}")]
    NotFound(String),

    #[error("Model configuration error: {0}")]
    ConfigError(String),

    #[error("Model execution failed: {0}")]
    ExecutionFailed(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Model API returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model declined the request: {0}")]
    Refused(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Http(format!("request timed out: {}", err))
        } else {
            ModelError::Http(err.to_string())
        }
    }
}

/// Configuration for a single model call
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Working directory for process-backed models
    pub working_dir: PathBuf,
    /// Optional per-call timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
    /// Model to use (if the backend supports selecting one)
    pub model: Option<String>,
    /// Upper bound on generated tokens for HTTP backends
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: HashMap::new(),
            model: None,
            max_tokens: 8192,
        }
    }
}

impl ModelConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Supported model backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    ClaudeCli,
    OpenCodeCli,
    Anthropic,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::ClaudeCli => write!(f, "claude"),
            ModelKind::OpenCodeCli => write!(f, "opencode"),
            ModelKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claude-cli" => Ok(ModelKind::ClaudeCli),
            "opencode" | "open-code" => Ok(ModelKind::OpenCodeCli),
            "anthropic" | "anthropic-api" | "api" => Ok(ModelKind::Anthropic),
            _ => Err(format!("Unknown model backend: {}", s)),
        }
    }
}

/// The core abstraction over text-generation backends
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable name of the backend (e.g., "Claude Code", "Anthropic API")
    fn name(&self) -> &str;

    /// The backend kind
    fn kind(&self) -> ModelKind;

    /// Send a prompt and return the raw completion text
    async fn complete(&self, prompt: &str, config: &ModelConfig)
        -> Result<ModelOutput, ModelError>;

    /// Check if the backend can be reached from this machine
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("claude".parse::<ModelKind>().unwrap(), ModelKind::ClaudeCli);
        assert_eq!(
            "OpenCode".parse::<ModelKind>().unwrap(),
            ModelKind::OpenCodeCli
        );
        assert_eq!("api".parse::<ModelKind>().unwrap(), ModelKind::Anthropic);
        assert!("gpt".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_model_kind_display_round_trips() {
        for kind in [
            ModelKind::ClaudeCli,
            ModelKind::OpenCodeCli,
            ModelKind::Anthropic,
        ] {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_config_builder() {
        let config = ModelConfig::new(PathBuf::from("/tmp"))
            .with_model("sonnet".into())
            .with_timeout(Duration::from_secs(5))
            .with_max_tokens(1024);
        assert_eq!(config.model.as_deref(), Some("sonnet"));
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_tokens, 1024);
    }
}
