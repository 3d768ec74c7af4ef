//! # reforge-model
//!
//! Language-model client layer for reforge.
//!
//! Every pipeline stage talks to a model through [`StructuredClient`], which
//! wraps a [`LanguageModel`] backend with a bounded [`RetryPolicy`] and
//! decodes the reply into a typed struct at the boundary.
//!
//! ## Backends
//!
//! - [`ClaudeCliModel`] - `claude --print`, prompt on stdin
//! - [`OpenCodeCliModel`] - `opencode run`
//! - [`AnthropicModel`] - Anthropic Messages API over HTTPS

mod anthropic;
mod claude;
mod opencode;
mod output;
mod retry;
mod spawner;
mod structured;
mod traits;

use std::sync::Arc;

pub use anthropic::{AnthropicModel, API_KEY_ENV};
pub use claude::ClaudeCliModel;
pub use opencode::OpenCodeCliModel;
pub use output::ModelOutput;
pub use retry::{with_retry, RetryPolicy};
pub use spawner::ProcessSpawner;
pub use structured::{decode_response, StructuredClient};
pub use traits::{LanguageModel, ModelConfig, ModelError, ModelKind};

/// Create a model backend by kind.
///
/// `api_key` is only consulted for HTTP backends; when absent the key is
/// read from `ANTHROPIC_API_KEY`.
pub fn create_model(
    kind: ModelKind,
    api_key: Option<String>,
) -> Result<Arc<dyn LanguageModel>, ModelError> {
    Ok(match kind {
        ModelKind::ClaudeCli => Arc::new(ClaudeCliModel::new()),
        ModelKind::OpenCodeCli => Arc::new(OpenCodeCliModel::new()),
        ModelKind::Anthropic => match api_key {
            Some(key) => Arc::new(AnthropicModel::new(key)?),
            None => Arc::new(AnthropicModel::from_env()?),
        },
    })
}
