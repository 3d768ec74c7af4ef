use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use tracing::warn;

use reforge_core::{ModificationPipeline, ModifyResult, ObjectSnapshot, StageClients};
use reforge_db::{Database, StoreError};
use reforge_eval::{Dimension, Thresholds, Verdict};
use reforge_logging::{AttemptJournal, LogEvent, Logger};
use reforge_model::{create_model, ModelConfig, ModelKind, RetryPolicy, StructuredClient};

use crate::config::{ProjectConfig, Role};
use crate::objects::read_file;

const DEFAULT_BACKEND: ModelKind = ModelKind::ClaudeCli;

/// Lease length when no attempt deadline is configured
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Exit code when another attempt holds the object, or it changed underneath
pub const EXIT_CONFLICT: i32 = 3;

/// Options for one `reforge modify` run
pub struct ModifyOptions {
    pub id: String,
    pub prompt: Option<String>,
    pub prompt_file: Option<PathBuf>,
    pub environment: Option<String>,
    pub threshold_constraint: Option<f64>,
    pub threshold_factuality: Option<f64>,
    pub threshold_preference: Option<f64>,
    pub backend: Option<ModelKind>,
    pub model: Option<String>,
    pub yes: bool,
    pub json_output: bool,
    pub dry_run: bool,
}

pub async fn handle_modify(
    db: &Database,
    config: &ProjectConfig,
    options: ModifyOptions,
    working_dir: &Path,
    logger: Arc<Logger>,
) -> Result<i32> {
    let prompt = resolve_prompt(&options)?;
    let object = db.objects().require(&options.id)?;
    if !object.status.accepts_modifications() {
        return Err(StoreError::InvalidState {
            id: object.id,
            status: object.status,
        }
        .into());
    }
    let snapshot = ObjectSnapshot {
        id: object.id.clone(),
        code: object.code.clone(),
        api_schema: object.api_schema.clone(),
        version: object.version,
    };

    let thresholds = resolve_thresholds(config, &options)?;

    let roles: Vec<(Role, ModelKind, Option<String>)> = Role::ALL
        .iter()
        .map(|&role| -> Result<(Role, ModelKind, Option<String>)> {
            let kind = match options.backend {
                Some(kind) => Ok(kind),
                None => config
                    .backend_for(role)
                    .map(|b| b.parse::<ModelKind>().map_err(anyhow::Error::msg))
                    .unwrap_or(Ok(DEFAULT_BACKEND)),
            }?;
            let model = options
                .model
                .clone()
                .or_else(|| config.model_for(role).map(String::from));
            Ok((role, kind, model))
        })
        .collect::<Result<_>>()?;

    if options.dry_run {
        println!("=== Dry Run ===");
        println!("Object: {} (v{}, {})", snapshot.id, snapshot.version, object.status);
        println!("Prompt: {}", preview(&prompt, 100));
        for (role, kind, model) in &roles {
            println!(
                "{:<10} {}{}",
                format!("{}:", role.as_str()),
                kind,
                model
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            );
        }
        println!(
            "Thresholds: constraint {:.2}, factuality {:.2}, preference {:.2}",
            thresholds.constraint, thresholds.factuality, thresholds.preference
        );
        match config.deadline() {
            Some(deadline) => println!("Deadline: {}s", deadline.as_secs()),
            None => println!("Deadline: none"),
        }
        return Ok(0);
    }

    // Held until the candidate is applied or discarded. Other processes
    // working on the same database see it too.
    let _lease = match db.acquire_lease(
        &snapshot.id,
        config.deadline().unwrap_or(DEFAULT_LEASE_TTL),
    ) {
        Ok(lease) => lease,
        Err(e @ StoreError::Leased { .. }) => {
            eprintln!("{} {}", "✗".bright_red(), e);
            return Ok(EXIT_CONFLICT);
        }
        Err(e) => return Err(e.into()),
    };

    let retry = RetryPolicy::new(config.retry_attempts.unwrap_or(2));
    let mut clients = Vec::with_capacity(roles.len());
    for (role, kind, model) in roles {
        let backend = create_model(kind, None)
            .with_context(|| format!("Failed to set up {} backend", role.as_str()))?;
        if !backend.is_available().await {
            bail!(
                "{} backend '{}' is not available. Make sure it's installed and in PATH.",
                role.as_str(),
                backend.name()
            );
        }

        let mut model_config =
            ModelConfig::new(working_dir.to_path_buf()).with_timeout(config.call_timeout());
        if let Some(model) = model {
            model_config = model_config.with_model(model);
        }
        clients.push(StructuredClient::new(backend, model_config).with_retry_policy(retry));
    }
    let mut clients = clients.into_iter();
    let (Some(planner), Some(generator), Some(evaluator)) =
        (clients.next(), clients.next(), clients.next())
    else {
        bail!("Missing model client for a pipeline role");
    };

    let mut pipeline = ModificationPipeline::new(
        StageClients {
            planner,
            generator,
            evaluator,
        },
        Arc::clone(&logger),
    )
    .with_weights(config.weights());
    if let Some(deadline) = config.deadline() {
        pipeline = pipeline.with_deadline(deadline);
    }
    match AttemptJournal::attempts_dir() {
        Ok(dir) => pipeline = pipeline.with_journal_dir(dir),
        Err(e) => warn!(error = %e, "Attempt journal disabled"),
    }

    let cancel = pipeline.cancel_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Cancelling modification attempt...");
        cancel.cancel();
    })
    .context("Failed to set Ctrl+C handler")?;

    let result = pipeline.attempt(&snapshot, &prompt, &thresholds).await;

    if options.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if let ModifyResult::Accepted { ref candidate, .. } = result {
        let apply = options.yes
            || Confirm::new()
                .with_prompt(format!(
                    "Apply this change to {} (v{} → v{})?",
                    snapshot.id,
                    snapshot.version,
                    snapshot.version + 1
                ))
                .default(true)
                .interact()?;

        if apply {
            return apply_candidate(
                db,
                &snapshot,
                &candidate.modified_code,
                &prompt,
                &candidate.short_summary(),
                &logger,
            );
        } else {
            eprintln!("{}", "Change not applied.".dimmed());
        }
    }

    Ok(result.exit_code())
}

/// Commit an accepted candidate on top of the version it was generated from
fn apply_candidate(
    db: &Database,
    snapshot: &ObjectSnapshot,
    code: &str,
    prompt: &str,
    summary: &str,
    logger: &Logger,
) -> Result<i32> {
    match db
        .objects()
        .apply_modification(&snapshot.id, snapshot.version, code, prompt, summary)
    {
        Ok(updated) => {
            logger.log(&LogEvent::ModificationApplied {
                object_id: updated.id,
                previous_version: snapshot.version,
                new_version: updated.version,
            });
            Ok(0)
        }
        Err(e @ StoreError::VersionConflict { .. }) => {
            eprintln!("{} Change not applied: {}", "✗".bright_red(), e);
            Ok(EXIT_CONFLICT)
        }
        Err(e) => Err(e.into()),
    }
}

fn resolve_prompt(options: &ModifyOptions) -> Result<String> {
    let prompt = match (&options.prompt, &options.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => read_file(path)?,
        (None, None) => bail!("No prompt provided. Use --prompt or --prompt-file"),
    };

    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        bail!("The modification prompt is empty");
    }
    Ok(prompt)
}

/// Priority: CLI flag > selected environment > [thresholds] > defaults
fn resolve_thresholds(config: &ProjectConfig, options: &ModifyOptions) -> Result<Thresholds> {
    let mut thresholds = config.thresholds(options.environment.as_deref())?;
    for (dimension, value) in [
        (Dimension::Constraint, options.threshold_constraint),
        (Dimension::Factuality, options.threshold_factuality),
        (Dimension::Preference, options.threshold_preference),
    ] {
        if let Some(value) = value {
            thresholds.set(dimension, value);
        }
    }
    thresholds.validate()?;
    Ok(thresholds)
}

fn print_result(result: &ModifyResult) {
    match result {
        ModifyResult::Accepted {
            candidate,
            verdict,
            duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("=== ACCEPTED ===");
            eprintln!("Score: {:.2}", verdict.score);
            eprintln!("Duration: {:.1}s", duration_secs);
            eprintln!("Summary: {}", candidate.modification_summary.trim());
            print_scores(verdict);
            if !candidate.risks.is_empty() {
                eprintln!("Risks:");
                for risk in &candidate.risks {
                    eprintln!("  - {}", risk);
                }
            }
            if !candidate.suggested_tests.is_empty() {
                eprintln!("Suggested tests:");
                for test in &candidate.suggested_tests {
                    eprintln!("  - {}: {}", test.name, test.purpose);
                }
            }
        }
        ModifyResult::Rejected {
            verdict,
            candidate_summary,
            duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("=== REJECTED ===");
            eprintln!("Candidate: {}", candidate_summary);
            eprintln!("Duration: {:.1}s", duration_secs);
            eprintln!();
            eprint!("{}", verdict.guidance());
        }
        ModifyResult::Failed {
            stage,
            error,
            duration_secs,
        } => {
            eprintln!();
            eprintln!("=== FAILED ===");
            eprintln!("Stage: {}", stage);
            eprintln!("Error: {}", error);
            eprintln!("Duration: {:.1}s", duration_secs);
        }
    }
}

fn print_scores(verdict: &Verdict) {
    for dimension in Dimension::ALL {
        match verdict.feedback.get(&dimension) {
            Some(feedback) => eprintln!(
                "  {} {:<11} {:.2} (threshold {:.2})",
                if feedback.passed {
                    "✓".bright_green()
                } else {
                    "✗".bright_red()
                },
                dimension.as_str(),
                feedback.score,
                feedback.threshold
            ),
            None => eprintln!(
                "  {} {:<11} {}",
                "–".dimmed(),
                dimension.as_str(),
                "not evaluated".dimmed()
            ),
        }
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}
