//! # reforge-logging
//!
//! Logging for the reforge modification pipeline.
//!
//! ## Key Types
//!
//! - [`Logger`] - Structured event logging to the console and optionally a file
//! - [`LogEvent`] - Pipeline event types
//! - [`LogFormat`] - Output formats (Pretty, JSON, Compact)
//! - [`AttemptJournal`] - One JSONL record per modification attempt

mod events;
mod journal;

pub use events::{LogEvent, LogFormat, Logger};
pub use journal::{read_journal, AttemptJournal, JournalLine, RoleModels};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application. Diagnostics go to stderr so
/// command output on stdout stays clean.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }
}
