use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One line of an attempt journal file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalLine {
    AttemptStart {
        timestamp: DateTime<Utc>,
        attempt_id: String,
        object_id: String,
        version: u64,
        prompt: String,
        planner_model: String,
        generator_model: String,
        evaluator_model: String,
    },
    Plan {
        constraint_check_needed: bool,
        factuality_check_needed: bool,
        steps: Vec<String>,
        reasoning: String,
        timestamp: DateTime<Utc>,
    },
    Candidate {
        modified_code: String,
        summary: String,
        timestamp: DateTime<Utc>,
    },
    Evaluation {
        dimension: String,
        score: f64,
        issues: Vec<String>,
        analysis: String,
        evaluation_failed: bool,
        timestamp: DateTime<Utc>,
    },
    AttemptEnd {
        outcome: String,
        score: Option<f64>,
        rejection_reason: Option<String>,
        error: Option<String>,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Models used for each role of an attempt
#[derive(Debug, Clone, Copy)]
pub struct RoleModels<'a> {
    pub planner: &'a str,
    pub generator: &'a str,
    pub evaluator: &'a str,
}

/// Writes one JSONL file per modification attempt under
/// `<data_dir>/reforge/attempts/`.
pub struct AttemptJournal {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl AttemptJournal {
    /// Open a journal in the default attempts directory
    pub fn new(object_id: &str, prompt: &str) -> io::Result<Self> {
        Self::in_dir(&Self::attempts_dir()?, object_id, prompt)
    }

    /// Open a journal in `dir`. The file name is the UTC timestamp plus a
    /// short hash of the object id and prompt.
    pub fn in_dir(dir: &Path, object_id: &str, prompt: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let timestamp_str = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(object_id.as_bytes());
        hasher.update([0]);
        hasher.update(prompt.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let path = dir.join(format!("{}_{}.jsonl", timestamp_str, &hash[..6]));
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_start(
        &self,
        attempt_id: &str,
        object_id: &str,
        version: u64,
        prompt: &str,
        models: RoleModels<'_>,
    ) {
        self.write_line(&JournalLine::AttemptStart {
            timestamp: Utc::now(),
            attempt_id: attempt_id.to_string(),
            object_id: object_id.to_string(),
            version,
            prompt: prompt.to_string(),
            planner_model: models.planner.to_string(),
            generator_model: models.generator.to_string(),
            evaluator_model: models.evaluator.to_string(),
        });
    }

    pub fn write_plan(
        &self,
        constraint_check_needed: bool,
        factuality_check_needed: bool,
        steps: &[String],
        reasoning: &str,
    ) {
        self.write_line(&JournalLine::Plan {
            constraint_check_needed,
            factuality_check_needed,
            steps: steps.to_vec(),
            reasoning: reasoning.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn write_candidate(&self, modified_code: &str, summary: &str) {
        self.write_line(&JournalLine::Candidate {
            modified_code: modified_code.to_string(),
            summary: summary.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn write_evaluation(
        &self,
        dimension: &str,
        score: f64,
        issues: &[String],
        analysis: &str,
        evaluation_failed: bool,
    ) {
        self.write_line(&JournalLine::Evaluation {
            dimension: dimension.to_string(),
            score,
            issues: issues.to_vec(),
            analysis: analysis.to_string(),
            evaluation_failed,
            timestamp: Utc::now(),
        });
    }

    pub fn write_end(
        &self,
        outcome: &str,
        score: Option<f64>,
        rejection_reason: Option<&str>,
        error: Option<&str>,
        duration_secs: f64,
    ) {
        self.write_line(&JournalLine::AttemptEnd {
            outcome: outcome.to_string(),
            score,
            rejection_reason: rejection_reason.map(String::from),
            error: error.map(String::from),
            duration_secs,
            timestamp: Utc::now(),
        });
    }

    fn write_line(&self, line: &JournalLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    pub fn attempts_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("reforge").join("attempts"))
    }
}

/// Read a journal file back, skipping lines that do not parse
pub fn read_journal(path: &Path) -> io::Result<Vec<JournalLine>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(parsed) = serde_json::from_str(&line) {
            lines.push(parsed);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_file_name_shape() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AttemptJournal::in_dir(dir.path(), "obj-1", "add logging").unwrap();
        let name = journal.path().file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".jsonl"));
        let stem = name.trim_end_matches(".jsonl");
        let hash = stem.rsplit('_').next().unwrap();
        assert_eq!(hash.len(), 6);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_journal_round_trips_full_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AttemptJournal::in_dir(dir.path(), "obj-1", "add logging").unwrap();

        journal.write_start(
            "a1",
            "obj-1",
            3,
            "add logging",
            RoleModels {
                planner: "claude",
                generator: "claude",
                evaluator: "anthropic",
            },
        );
        journal.write_plan(true, false, &["wrap calls".into()], "touches API");
        journal.write_candidate("fn a() {}", "added logging");
        journal.write_evaluation("constraint", 0.9, &[], "fine", false);
        journal.write_end("accepted", Some(0.9), None, None, 1.5);

        let lines = read_journal(journal.path()).unwrap();
        assert_eq!(lines.len(), 5);
        assert!(matches!(
            &lines[0],
            JournalLine::AttemptStart { version: 3, evaluator_model, .. }
                if evaluator_model == "anthropic"
        ));
        assert!(matches!(
            &lines[4],
            JournalLine::AttemptEnd { outcome, score: Some(_), .. } if outcome == "accepted"
        ));
    }

    #[test]
    fn test_read_journal_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        fs::write(
            &path,
            "not json\n\n{\"type\":\"candidate\",\"modified_code\":\"x\",\"summary\":\"s\",\"timestamp\":\"2026-01-01T00:00:00Z\"}\n",
        )
        .unwrap();
        let lines = read_journal(&path).unwrap();
        assert_eq!(lines.len(), 1);
    }
}
