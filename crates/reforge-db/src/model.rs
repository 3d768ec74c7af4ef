use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a modifiable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    Draft,
    Active,
    Deployed,
    Failed,
    Deprecated,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Draft => "draft",
            ObjectStatus::Active => "active",
            ObjectStatus::Deployed => "deployed",
            ObjectStatus::Failed => "failed",
            ObjectStatus::Deprecated => "deprecated",
        }
    }

    /// Whether new code may still be applied
    pub fn accepts_modifications(&self) -> bool {
        !matches!(self, ObjectStatus::Deprecated)
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ObjectStatus::Draft),
            "active" => Ok(ObjectStatus::Active),
            "deployed" => Ok(ObjectStatus::Deployed),
            "failed" => Ok(ObjectStatus::Failed),
            "deprecated" => Ok(ObjectStatus::Deprecated),
            _ => Err(format!("Unknown object status: {}", s)),
        }
    }
}

/// One accepted modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub previous_version: u64,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub timestamp: DateTime<Utc>,
    pub from_version: u64,
    pub to_version: u64,
    pub reason: Option<String>,
}

/// A persistent, versioned unit of code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiableObject {
    pub id: String,
    pub code: String,
    pub api_schema: Option<String>,
    /// Starts at 1 and only ever increases
    pub version: u64,
    pub status: ObjectStatus,
    pub modification_history: Vec<ModificationRecord>,
    pub deployment_history: Vec<DeploymentRecord>,
    pub rollback_history: Vec<RollbackRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("Deployed".parse::<ObjectStatus>().unwrap(), ObjectStatus::Deployed);
        assert!("archived".parse::<ObjectStatus>().is_err());
        assert_eq!(ObjectStatus::Deprecated.to_string(), "deprecated");
    }

    #[test]
    fn test_only_deprecated_refuses_modifications() {
        assert!(ObjectStatus::Draft.accepts_modifications());
        assert!(ObjectStatus::Failed.accepts_modifications());
        assert!(!ObjectStatus::Deprecated.accepts_modifications());
    }
}
