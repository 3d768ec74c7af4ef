use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only view of the object a modification attempt starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: String,
    /// Current code body, empty for a new object
    pub code: String,
    pub api_schema: Option<String>,
    pub version: u64,
}

impl ObjectSnapshot {
    pub fn new(id: impl Into<String>, code: impl Into<String>, version: u64) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            api_schema: None,
            version,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.api_schema = Some(schema.into());
        self
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Generating,
    Evaluating,
    Judging,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Generating => "generating",
            Stage::Evaluating => "evaluating",
            Stage::Judging => "judging",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
