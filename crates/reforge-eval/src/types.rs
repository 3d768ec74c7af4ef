use serde::{Deserialize, Serialize};

/// Planner output: which checks a modification needs, and how to approach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationPlan {
    /// Whether interface/API constraints must be verified.
    /// Absent from a model reply means "check it".
    #[serde(default = "default_true")]
    pub constraint_check_needed: bool,
    /// Whether technical/algorithmic correctness must be verified
    #[serde(default = "default_true")]
    pub factuality_check_needed: bool,
    /// Ordered implementation steps
    #[serde(default, alias = "plan")]
    pub steps: Vec<String>,
    /// Free-text reasoning trace
    #[serde(default)]
    pub reasoning: String,
}

fn default_true() -> bool {
    true
}

impl ModificationPlan {
    /// Number of gated checks this plan turns on
    pub fn gated_checks(&self) -> usize {
        usize::from(self.constraint_check_needed) + usize::from(self.factuality_check_needed)
    }
}

/// A test the generator suggests for its own change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedTest {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub code: String,
}

/// Candidate code change produced by the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeModification {
    /// Full replacement code body (not a diff)
    pub modified_code: String,
    #[serde(default, alias = "summary")]
    pub modification_summary: String,
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub considerations: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub suggested_tests: Vec<SuggestedTest>,
}

impl CodeModification {
    pub fn line_count(&self) -> usize {
        self.modified_code.lines().count()
    }

    /// One-line description for logs and history records
    pub fn short_summary(&self) -> String {
        let first = self
            .modification_summary
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("(no summary)")
            .trim();
        if first.chars().count() > 120 {
            format!("{}...", first.chars().take(117).collect::<String>())
        } else {
            first.to_string()
        }
    }
}
