use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for a modification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    AttemptStarted {
        attempt_id: String,
        object_id: String,
        version: u64,
        prompt: String,
    },
    PlanCreated {
        constraint_check_needed: bool,
        factuality_check_needed: bool,
        steps: usize,
        duration_secs: f64,
    },
    CandidateGenerated {
        lines: usize,
        summary: String,
        duration_secs: f64,
    },
    CheckSkipped {
        dimension: String,
    },
    DimensionEvaluated {
        dimension: String,
        score: f64,
        threshold: f64,
        issues: usize,
        evaluation_failed: bool,
    },
    VerdictReached {
        accepted: bool,
        score: f64,
        rejection_reason: Option<String>,
        duration_secs: f64,
    },
    AttemptFailed {
        stage: String,
        error: String,
    },
    ModificationApplied {
        object_id: String,
        previous_version: u64,
        new_version: u64,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for pipeline events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    console: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            file_writer: None,
        }
    }

    /// A logger that renders nothing (library callers, tests)
    pub fn silent() -> Self {
        Self {
            format: LogFormat::Compact,
            console: false,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            console: true,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::AttemptStarted {
                object_id,
                version,
                prompt,
                ..
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "reforge".bold().bright_white(),
                    " ".repeat(60) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Object:".dimmed(),
                    Self::truncate_with_padding(&format!("{} (v{})", object_id, version), 60, 67)
                        .dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Prompt:".dimmed(),
                    Self::truncate_with_padding(prompt, 60, 67).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::PlanCreated {
                constraint_check_needed,
                factuality_check_needed,
                steps,
                duration_secs,
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "PLAN".bright_cyan().bold()
                );
                let _ = writeln!(
                    stderr,
                    "    {} {} steps, constraint check: {}, factuality check: {} ({:.1}s)",
                    "✓".bright_green(),
                    steps,
                    yes_no(*constraint_check_needed),
                    yes_no(*factuality_check_needed),
                    duration_secs
                );
                let _ = writeln!(stderr);
            }
            LogEvent::CandidateGenerated {
                lines,
                summary,
                duration_secs,
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "GENERATE".bright_cyan().bold()
                );
                let _ = writeln!(
                    stderr,
                    "    {} {} lines ({:.1}s)",
                    "✓".bright_green(),
                    lines,
                    duration_secs
                );
                let _ = writeln!(stderr, "    {} {}", "│".dimmed(), summary.dimmed());
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "EVALUATE".bright_magenta().bold()
                );
            }
            LogEvent::CheckSkipped { dimension } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} {}",
                    "–".dimmed(),
                    dimension.dimmed(),
                    "skipped (not required by plan)".dimmed()
                );
            }
            LogEvent::DimensionEvaluated {
                dimension,
                score,
                threshold,
                issues,
                evaluation_failed,
            } => {
                let line = format!(
                    "{} {:.2} / {:.2}{}",
                    dimension,
                    score,
                    threshold,
                    if *issues > 0 {
                        format!(" ({} issues)", issues)
                    } else {
                        String::new()
                    }
                );
                if *evaluation_failed {
                    let _ = writeln!(
                        stderr,
                        "    {} {} {}",
                        "✗".bright_red(),
                        line.bright_red(),
                        "(evaluation failed)".dimmed()
                    );
                } else if score >= threshold {
                    let _ = writeln!(stderr, "    {} {}", "✓".bright_green(), line);
                } else {
                    let _ = writeln!(stderr, "    {} {}", "✗".bright_yellow(), line.bright_yellow());
                }
            }
            LogEvent::VerdictReached {
                accepted,
                score,
                rejection_reason,
                ..
            } => {
                let _ = writeln!(stderr);
                if *accepted {
                    let _ = writeln!(
                        stderr,
                        "  {}",
                        format!("✓ Accepted (score {:.2})", score).bright_green()
                    );
                } else {
                    let _ = writeln!(
                        stderr,
                        "  {}",
                        format!(
                            "→ Rejected (score {:.2}): {}",
                            score,
                            rejection_reason.as_deref().unwrap_or("below threshold")
                        )
                        .bright_yellow()
                    );
                }
                let _ = writeln!(stderr);
            }
            LogEvent::AttemptFailed { stage, error } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Failed during {}: {}",
                    "✗".bright_red(),
                    stage,
                    error.bright_red()
                );
            }
            LogEvent::ModificationApplied {
                object_id,
                previous_version,
                new_version,
            } => {
                let _ = writeln!(
                    stderr,
                    "{} Applied to {}: v{} → v{}",
                    "✓".bright_green(),
                    object_id.bold(),
                    previous_version,
                    new_version
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::AttemptStarted {
                object_id, version, ..
            } => format!("[{}] attempt:start {}@v{}", timestamp, object_id, version),
            LogEvent::PlanCreated {
                constraint_check_needed,
                factuality_check_needed,
                steps,
                duration_secs,
            } => format!(
                "[{}] plan:done steps={} constraint={} factuality={} {:.1}s",
                timestamp, steps, constraint_check_needed, factuality_check_needed, duration_secs
            ),
            LogEvent::CandidateGenerated {
                lines,
                duration_secs,
                ..
            } => format!(
                "[{}] generate:done lines={} {:.1}s",
                timestamp, lines, duration_secs
            ),
            LogEvent::CheckSkipped { dimension } => {
                format!("[{}] check:skip {}", timestamp, dimension)
            }
            LogEvent::DimensionEvaluated {
                dimension,
                score,
                threshold,
                evaluation_failed,
                ..
            } => format!(
                "[{}] check:{} {:.2}/{:.2}{}",
                timestamp,
                dimension,
                score,
                threshold,
                if *evaluation_failed { " failed" } else { "" }
            ),
            LogEvent::VerdictReached {
                accepted,
                score,
                duration_secs,
                ..
            } => format!(
                "[{}] verdict:{} {:.2} {:.1}s",
                timestamp,
                if *accepted { "accepted" } else { "rejected" },
                score,
                duration_secs
            ),
            LogEvent::AttemptFailed { stage, error } => {
                format!("[{}] error:{}:{}", timestamp, stage, error)
            }
            LogEvent::ModificationApplied {
                object_id,
                new_version,
                ..
            } => format!("[{}] applied {}@v{}", timestamp, object_id, new_version),
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let first_line = s.lines().next().unwrap_or_default();
        let truncated = if first_line.chars().count() > max_len {
            format!(
                "{}...",
                first_line.chars().take(max_len - 3).collect::<String>()
            )
        } else {
            first_line.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
