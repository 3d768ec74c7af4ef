use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{LanguageModel, ModelConfig, ModelError, ModelKind, ModelOutput, ProcessSpawner};

/// Claude Code CLI used as a plain text-generation backend
pub struct ClaudeCliModel {
    binary_path: PathBuf,
}

impl ClaudeCliModel {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("claude"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl Default for ClaudeCliModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ClaudeCliModel {
    fn name(&self) -> &str {
        "Claude Code"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::ClaudeCli
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn complete(
        &self,
        prompt: &str,
        config: &ModelConfig,
    ) -> Result<ModelOutput, ModelError> {
        debug!(model = self.name(), prompt_len = prompt.len(), "Requesting completion");

        // Non-interactive, text only; the prompt goes over stdin because
        // full code bodies easily exceed argv limits
        let mut args = vec!["--print", "--output-format", "text"];

        let model_arg;
        if let Some(ref model) = config.model {
            args.push("--model");
            model_arg = model.clone();
            args.push(&model_arg);
        }

        let output = ProcessSpawner::spawn(&self.binary_path, &args, Some(prompt), config).await?;

        if !output.success() {
            return Err(ModelError::ExecutionFailed(format!(
                "{} exited with code {}: {}",
                self.name(),
                output.exit_code,
                output.diagnostics.lines().last().unwrap_or_default()
            )));
        }

        Ok(output)
    }
}
