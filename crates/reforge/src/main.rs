mod config;
mod modify;
mod objects;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use reforge_db::ObjectStatus;
use reforge_logging::{init_tracing, LogFormat, Logger};
use reforge_model::ModelKind;

use crate::config::ProjectConfig;
use crate::modify::ModifyOptions;

#[derive(Parser, Debug)]
#[command(
    name = "reforge",
    about = "Prompt-driven modification of versioned code objects, gated by model review",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (default: ~/.local/share/reforge/reforge.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Working directory holding reforge.toml (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Also append pipeline events as JSON lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Diagnostic log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new object from a source file
    Create {
        id: String,
        /// File holding the initial code body
        #[arg(short, long)]
        file: PathBuf,
        /// File holding the object's API schema
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Plan, generate and review a change, then apply it if accepted
    Modify {
        id: String,

        /// Modification request
        #[arg(short, long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the modification request from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Use the thresholds of a configured environment
        #[arg(short, long)]
        env: Option<String>,

        #[arg(long)]
        threshold_constraint: Option<f64>,

        #[arg(long)]
        threshold_factuality: Option<f64>,

        #[arg(long)]
        threshold_preference: Option<f64>,

        /// Backend for every role, overriding reforge.toml
        #[arg(short, long, value_enum)]
        backend: Option<BackendChoice>,

        /// Model for every role, overriding reforge.toml
        #[arg(short, long)]
        model: Option<String>,

        /// Apply an accepted change without asking
        #[arg(short, long)]
        yes: bool,

        /// Output the result as JSON
        #[arg(long)]
        json_output: bool,

        /// Show what would run without calling any model
        #[arg(long)]
        dry_run: bool,
    },

    /// Show an object's metadata and current code
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// List objects
    List {
        /// Only objects in this status
        #[arg(long)]
        status: Option<ObjectStatus>,
        #[arg(long)]
        json: bool,
    },

    /// Show modification, deployment and rollback history
    History {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Write an object's code to a file
    Export {
        id: String,
        #[arg(short, long)]
        out: PathBuf,
        /// Export this version instead of the current one
        #[arg(long)]
        at: Option<u64>,
    },

    /// Restore the code of an earlier version as a new version
    Rollback {
        id: String,
        #[arg(long)]
        to: u64,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Record a deployment of the current version
    Deploy {
        id: String,
        #[arg(short, long)]
        env: String,
    },

    /// Set an object's lifecycle status
    Status { id: String, status: ObjectStatus },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendChoice {
    Claude,
    Opencode,
    Anthropic,
}

impl From<BackendChoice> for ModelKind {
    fn from(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Claude => ModelKind::ClaudeCli,
            BackendChoice::Opencode => ModelKind::OpenCodeCli,
            BackendChoice::Anthropic => ModelKind::Anthropic,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    let working_dir = match cli.working_dir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let db = objects::open_database(cli.db.as_ref())?;

    match cli.command {
        Commands::Create { id, file, schema } => {
            objects::handle_create(&db, &id, &file, schema.as_deref())
        }
        Commands::Modify {
            id,
            prompt,
            prompt_file,
            env,
            threshold_constraint,
            threshold_factuality,
            threshold_preference,
            backend,
            model,
            yes,
            json_output,
            dry_run,
        } => {
            let config = ProjectConfig::load(&working_dir)?.unwrap_or_default();
            let logger = match cli.log_file {
                Some(ref path) => Logger::with_file(log_format, path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?,
                None => Logger::new(log_format),
            };

            let options = ModifyOptions {
                id,
                prompt,
                prompt_file,
                environment: env,
                threshold_constraint,
                threshold_factuality,
                threshold_preference,
                backend: backend.map(Into::into),
                model,
                yes,
                json_output,
                dry_run,
            };

            let code =
                modify::handle_modify(&db, &config, options, &working_dir, Arc::new(logger))
                    .await?;
            std::process::exit(code);
        }
        Commands::Show { id, json } => objects::handle_show(&db, &id, json),
        Commands::List { status, json } => objects::handle_list(&db, status, json),
        Commands::History { id, json } => objects::handle_history(&db, &id, json),
        Commands::Export { id, out, at } => objects::handle_export(&db, &id, &out, at),
        Commands::Rollback { id, to, reason } => {
            objects::handle_rollback(&db, &id, to, reason.as_deref())
        }
        Commands::Deploy { id, env } => objects::handle_deploy(&db, &id, &env),
        Commands::Status { id, status } => objects::handle_status(&db, &id, status),
    }
}
