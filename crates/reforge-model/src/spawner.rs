use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::{ModelConfig, ModelError, ModelOutput};

/// Utility for running model CLIs as child processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process, optionally feed `stdin`, and capture its output.
    ///
    /// The child is killed if `config.timeout` elapses first.
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        stdin: Option<&str>,
        config: &ModelConfig,
    ) -> Result<ModelOutput, ModelError> {
        let run = Self::run(binary, args, stdin, config);

        match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(binary = %binary.display(), ?limit, "Model process timed out");
                    Err(ModelError::Timeout(limit))
                }
            },
            None => run.await,
        }
    }

    async fn run(
        binary: &Path,
        args: &[&str],
        stdin: Option<&str>,
        config: &ModelConfig,
    ) -> Result<ModelOutput, ModelError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            arg_count = args.len(),
            stdin_len = stdin.map(str::len).unwrap_or(0),
            working_dir = %config.working_dir.display(),
            "Spawning model process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ModelError::NotFound(binary.display().to_string()),
            _ => ModelError::SpawnFailed(e),
        })?;

        // Feed stdin from a separate task so a chatty child cannot deadlock us
        let writer = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut handle)) => {
                let bytes = input.as_bytes().to_vec();
                Some(tokio::spawn(async move {
                    let result = handle.write_all(&bytes).await;
                    drop(handle);
                    result
                }))
            }
            _ => None,
        };

        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| ModelError::ExecutionFailed("stdout not captured".into()))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| ModelError::ExecutionFailed("stderr not captured".into()))?;

        let mut stdout_reader = BufReader::new(stdout_handle).lines();
        let mut stderr_reader = BufReader::new(stderr_handle).lines();

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                biased;

                result = stdout_reader.next_line(), if stdout_open => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stdout");
                            push_line(&mut stdout, &line);
                        }
                        Ok(None) => stdout_open = false,
                        Err(e) => {
                            return Err(ModelError::ExecutionFailed(format!(
                                "Failed to read stdout: {}",
                                e
                            )));
                        }
                    }
                }
                result = stderr_reader.next_line(), if stderr_open => {
                    match result {
                        Ok(Some(line)) => {
                            trace!(line = %line, "stderr");
                            push_line(&mut stderr, &line);
                        }
                        Ok(None) => stderr_open = false,
                        Err(e) => {
                            return Err(ModelError::ExecutionFailed(format!(
                                "Failed to read stderr: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The child may legitimately exit before draining stdin
                Ok(Err(e)) => debug!(error = %e, "Model process closed stdin early"),
                Err(e) => debug!(error = %e, "stdin writer task failed"),
            }
        }

        let status = child.wait().await?;
        let duration = start.elapsed();

        debug!(
            exit_code = status.code().unwrap_or(-1),
            duration_ms = duration.as_millis(),
            "Model process completed"
        );

        Ok(ModelOutput::new(
            stdout,
            stderr,
            status.code().unwrap_or(-1),
            duration,
        ))
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_captures_stdin_echo() {
        let config = ModelConfig::new(std::env::temp_dir());
        let output = ProcessSpawner::spawn(Path::new("cat"), &[], Some("hello\nworld"), &config)
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.text, "hello\nworld");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let config = ModelConfig::new(std::env::temp_dir());
        let result = ProcessSpawner::spawn(
            &PathBuf::from("reforge-definitely-not-a-binary"),
            &[],
            None,
            &config,
        )
        .await;
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_spawn_timeout() {
        let config =
            ModelConfig::new(std::env::temp_dir()).with_timeout(Duration::from_millis(100));
        let result = ProcessSpawner::spawn(Path::new("sleep"), &["5"], None, &config).await;
        assert!(matches!(result, Err(ModelError::Timeout(_))));
    }
}
