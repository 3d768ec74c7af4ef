use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;

use reforge_db::{Database, ModifiableObject, ObjectStatus};

pub fn handle_create(db: &Database, id: &str, file: &Path, schema: Option<&Path>) -> Result<()> {
    let code = read_file(file)?;
    let schema = schema.map(read_file).transpose()?;

    let object = db
        .objects()
        .create(id, &code, schema.as_deref())
        .with_context(|| format!("Failed to create '{}'", id))?;

    eprintln!(
        "{} Created {} at version {} ({} lines)",
        "✓".bright_green(),
        object.id.bold(),
        object.version,
        object.code.lines().count()
    );
    Ok(())
}

pub fn handle_show(db: &Database, id: &str, json: bool) -> Result<()> {
    let object = db.objects().require(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&object)?);
        return Ok(());
    }

    println!("{}", object.id.bold());
    println!("  {:<10} {}", "Version:".dimmed(), object.version);
    println!("  {:<10} {}", "Status:".dimmed(), colored_status(object.status));
    println!(
        "  {:<10} {}",
        "Schema:".dimmed(),
        if object.api_schema.is_some() {
            "declared"
        } else {
            "none"
        }
    );
    println!("  {:<10} {}", "Updated:".dimmed(), format_time(&object.updated_at));
    println!();
    println!("{}", object.code);
    Ok(())
}

pub fn handle_list(db: &Database, status: Option<ObjectStatus>, json: bool) -> Result<()> {
    let objects = db.objects().list(status)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
    } else if objects.is_empty() {
        println!("{}", "No objects found.".dimmed());
    } else {
        print_objects_table(&objects);
    }
    Ok(())
}

pub fn handle_history(db: &Database, id: &str, json: bool) -> Result<()> {
    let object = db.objects().require(id)?;

    if json {
        let history = serde_json::json!({
            "modifications": object.modification_history,
            "deployments": object.deployment_history,
            "rollbacks": object.rollback_history,
        });
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    let mut entries: Vec<(DateTime<Utc>, String)> = Vec::new();
    for m in &object.modification_history {
        entries.push((
            m.timestamp,
            format!(
                "{} v{} → v{}  {}\n      {} {}",
                "modify  ".bright_cyan(),
                m.previous_version,
                m.previous_version + 1,
                m.summary,
                "prompt:".dimmed(),
                truncate(&m.prompt, 70).dimmed()
            ),
        ));
    }
    for d in &object.deployment_history {
        entries.push((
            d.timestamp,
            format!("{} v{} to {}", "deploy  ".bright_green(), d.version, d.environment),
        ));
    }
    for r in &object.rollback_history {
        entries.push((
            r.timestamp,
            format!(
                "{} v{} → code of v{}{}",
                "rollback".bright_yellow(),
                r.from_version,
                r.to_version,
                r.reason
                    .as_deref()
                    .map(|reason| format!(" ({})", reason))
                    .unwrap_or_default()
            ),
        ));
    }

    if entries.is_empty() {
        println!("{}", "No history yet.".dimmed());
        return Ok(());
    }

    entries.sort_by_key(|(timestamp, _)| *timestamp);
    for (timestamp, line) in entries {
        println!("{}  {}", format_time(&timestamp).dimmed(), line);
    }
    Ok(())
}

pub fn handle_export(db: &Database, id: &str, out: &Path, version: Option<u64>) -> Result<()> {
    let code = match version {
        Some(v) => db
            .objects()
            .code_at(id, v)?
            .with_context(|| format!("'{}' has no version {}", id, v))?,
        None => db.objects().require(id)?.code,
    };

    std::fs::write(out, &code).with_context(|| format!("Failed to write {}", out.display()))?;
    eprintln!(
        "{} Exported {} to {}",
        "✓".bright_green(),
        id.bold(),
        out.display()
    );
    Ok(())
}

pub fn handle_rollback(db: &Database, id: &str, to: u64, reason: Option<&str>) -> Result<()> {
    let object = db.objects().rollback(id, to, reason)?;
    eprintln!(
        "{} Rolled {} back to the code of v{} (now v{})",
        "✓".bright_green(),
        id.bold(),
        to,
        object.version
    );
    Ok(())
}

pub fn handle_deploy(db: &Database, id: &str, environment: &str) -> Result<()> {
    let record = db.objects().record_deployment(id, environment)?;
    eprintln!(
        "{} Recorded deployment of {} v{} to {}",
        "✓".bright_green(),
        id.bold(),
        record.version,
        environment
    );
    Ok(())
}

pub fn handle_status(db: &Database, id: &str, status: ObjectStatus) -> Result<()> {
    db.objects().set_status(id, status)?;
    eprintln!(
        "{} {} is now {}",
        "✓".bright_green(),
        id.bold(),
        colored_status(status)
    );
    Ok(())
}

fn print_objects_table(objects: &[ModifiableObject]) {
    println!(
        "{:<24} {:>7}  {:<11} {:>6}  {}",
        "ID".bold(),
        "VERSION".bold(),
        "STATUS".bold(),
        "MODS".bold(),
        "UPDATED".bold()
    );
    for object in objects {
        println!(
            "{:<24} {:>7}  {:<11} {:>6}  {}",
            truncate(&object.id, 24),
            object.version,
            colored_status(object.status),
            object.modification_history.len(),
            format_time(&object.updated_at).dimmed()
        );
    }
}

fn colored_status(status: ObjectStatus) -> colored::ColoredString {
    let label = status.as_str();
    match status {
        ObjectStatus::Draft => label.dimmed(),
        ObjectStatus::Active => label.bright_cyan(),
        ObjectStatus::Deployed => label.bright_green(),
        ObjectStatus::Failed => label.bright_red(),
        ObjectStatus::Deprecated => label.yellow(),
    }
}

fn format_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() > max {
        format!("{}...", first_line.chars().take(max - 3).collect::<String>())
    } else {
        first_line.to_string()
    }
}

pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Database at `--db` if given, otherwise the default location
pub fn open_database(path: Option<&PathBuf>) -> Result<Database> {
    match path {
        Some(path) => Database::open_at(path)
            .with_context(|| format!("Failed to open database at {}", path.display())),
        None => Database::open().context("Failed to open database"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer line", 8), "a mu...");
        assert_eq!(truncate("first\nsecond", 20), "first");
    }

    #[test]
    fn test_export_writes_requested_version() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.objects().create("obj", "one", None).unwrap();
        db.objects()
            .apply_modification("obj", 1, "two", "p", "s")
            .unwrap();

        let out = dir.path().join("v1.txt");
        handle_export(&db, "obj", &out, Some(1)).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "one");

        let out = dir.path().join("current.txt");
        handle_export(&db, "obj", &out, None).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "two");

        assert!(handle_export(&db, "obj", &out, Some(9)).is_err());
    }

    #[test]
    fn test_create_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("code.rs");
        let schema = dir.path().join("schema.json");
        std::fs::write(&code, "fn main() {}").unwrap();
        std::fs::write(&schema, "{}").unwrap();

        let db = Database::open_in_memory().unwrap();
        handle_create(&db, "app", &code, Some(&schema)).unwrap();

        let object = db.objects().require("app").unwrap();
        assert_eq!(object.code, "fn main() {}");
        assert_eq!(object.api_schema.as_deref(), Some("{}"));
    }
}
