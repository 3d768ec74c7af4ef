use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{LanguageModel, ModelConfig, ModelError, ModelKind, ModelOutput, ProcessSpawner};

/// OpenCode CLI used as a plain text-generation backend
pub struct OpenCodeCliModel {
    binary_path: PathBuf,
}

impl OpenCodeCliModel {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("opencode"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl Default for OpenCodeCliModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for OpenCodeCliModel {
    fn name(&self) -> &str {
        "OpenCode"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::OpenCodeCli
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

        // `run` is the non-interactive subcommand. It reads the message
        // from piped stdin, which has no size limit unlike argv.
        let mut args = vec!["run"];

        let model_arg;
        if let Some(ref model) = config.model {
            args.push("--model");
            model_arg = model.clone();
            args.push(&model_arg);
        }

        let output = ProcessSpawner::spawn(&self.binary_path, &args, Some(prompt), config).await?;

        if !output.success() {
            return Err(ModelError::ExecutionFailed(format!(
                "{} exited with code {}",
                self.name(),
                output.exit_code
            )));
        }

        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn test_prompt_larger_than_argv_limit_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("opencode");
        std::fs::write(&script, "#!/bin/sh\ncat\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // Above Linux's 128 KiB limit for a single argument
        let prompt = "x".repeat(200 * 1024);
        let model = OpenCodeCliModel::with_binary_path(script);
        let output = model
            .complete(&prompt, &ModelConfig::new(dir.path().to_path_buf()))
            .await
            .unwrap();

        assert_eq!(output.text.len(), prompt.len());
    }
}
