//! Project configuration file support for reforge.
//!
//! Loads configuration from `reforge.toml` in the working directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reforge_eval::{Dimension, Thresholds, Weights};
use reforge_model::ModelKind;

/// The config file name
pub const CONFIG_FILE_NAME: &str = "reforge.toml";

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 300;
/// Upper bound for `call_timeout_secs` and `deadline_secs` (one week)
const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Project-level configuration loaded from `reforge.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Global default backend (claude, opencode, anthropic)
    pub backend: Option<String>,
    /// Global default model
    pub model: Option<String>,
    /// Attempts per model call, including the first
    pub retry_attempts: Option<u32>,
    pub call_timeout_secs: Option<u64>,
    /// Wall-clock limit for a whole modification attempt
    pub deadline_secs: Option<u64>,
    #[serde(default)]
    pub planner: RoleConfig,
    #[serde(default)]
    pub generator: RoleConfig,
    #[serde(default)]
    pub evaluator: RoleConfig,
    #[serde(default)]
    pub thresholds: ThresholdOverrides,
    #[serde(default)]
    pub weights: WeightOverrides,
    /// Named environments, e.g. `[environments.production.thresholds]`
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

/// Backend/model override for a single pipeline role
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub backend: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct ThresholdOverrides {
    pub constraint: Option<f64>,
    pub factuality: Option<f64>,
    pub preference: Option<f64>,
}

impl ThresholdOverrides {
    pub fn apply_to(&self, thresholds: &mut Thresholds) {
        for (dimension, value) in [
            (Dimension::Constraint, self.constraint),
            (Dimension::Factuality, self.factuality),
            (Dimension::Preference, self.preference),
        ] {
            if let Some(value) = value {
                thresholds.set(dimension, value);
            }
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct WeightOverrides {
    pub constraint: Option<f64>,
    pub factuality: Option<f64>,
    pub preference: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub thresholds: ThresholdOverrides,
}

/// Pipeline roles that can be configured independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Planner,
    Generator,
    Evaluator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Planner, Role::Generator, Role::Evaluator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Generator => "generator",
            Role::Evaluator => "evaluator",
        }
    }
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists, parses and validates
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but is invalid (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid {}", config_path.display()))?;

        Ok(Some(config))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn role(&self, role: Role) -> &RoleConfig {
        match role {
            Role::Planner => &self.planner,
            Role::Generator => &self.generator,
            Role::Evaluator => &self.evaluator,
        }
    }

    /// Get the effective backend for a role.
    /// Priority: [role].backend > global backend > None
    pub fn backend_for(&self, role: Role) -> Option<&str> {
        self.role(role)
            .backend
            .as_deref()
            .or(self.backend.as_deref())
    }

    /// Get the effective model for a role.
    /// Priority: [role].model > global model > None
    pub fn model_for(&self, role: Role) -> Option<&str> {
        self.role(role).model.as_deref().or(self.model.as_deref())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.unwrap_or(DEFAULT_CALL_TIMEOUT_SECS))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Thresholds with the base section and then the named environment
    /// layered over the defaults.
    pub fn thresholds(&self, environment: Option<&str>) -> Result<Thresholds> {
        let mut thresholds = Thresholds::default();
        self.thresholds.apply_to(&mut thresholds);

        if let Some(name) = environment {
            let Some(env) = self.environments.get(name) else {
                bail!(
                    "Unknown environment '{}' (configured: {})",
                    name,
                    self.environment_names()
                );
            };
            env.thresholds.apply_to(&mut thresholds);
        }

        Ok(thresholds)
    }

    pub fn weights(&self) -> Weights {
        let defaults = Weights::default();
        Weights {
            constraint: self.weights.constraint.unwrap_or(defaults.constraint),
            factuality: self.weights.factuality.unwrap_or(defaults.factuality),
            preference: self.weights.preference.unwrap_or(defaults.preference),
        }
    }

    fn environment_names(&self) -> String {
        if self.environments.is_empty() {
            return "none".to_string();
        }
        self.environments
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn validate(&self) -> Result<()> {
        for role in Role::ALL {
            if let Some(backend) = self.backend_for(role) {
                backend
                    .parse::<ModelKind>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("Invalid backend for {}", role.as_str()))?;
            }
        }

        if self.retry_attempts == Some(0) {
            bail!("retry_attempts must be at least 1");
        }
        for (key, value) in [
            ("call_timeout_secs", self.call_timeout_secs),
            ("deadline_secs", self.deadline_secs),
        ] {
            match value {
                Some(0) => bail!("{} must be greater than 0", key),
                Some(secs) if secs > MAX_DURATION_SECS => {
                    bail!("{} must be at most {}", key, MAX_DURATION_SECS)
                }
                _ => {}
            }
        }

        self.thresholds(None)?
            .validate()
            .context("Invalid [thresholds]")?;
        for name in self.environments.keys() {
            self.thresholds(Some(name))?
                .validate()
                .with_context(|| format!("Invalid [environments.{}.thresholds]", name))?;
        }
        self.weights().validate().context("Invalid [weights]")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
backend = "claude"
model = "sonnet"
retry_attempts = 3
call_timeout_secs = 120
deadline_secs = 600

[evaluator]
backend = "anthropic"
model = "opus"

[thresholds]
constraint = 0.75

[weights]
preference = 0.5

[environments.production.thresholds]
constraint = 0.9
factuality = 0.9
"#;

    #[test]
    fn test_role_resolution() {
        let config = ProjectConfig::parse(FULL).unwrap();
        assert_eq!(config.backend_for(Role::Planner), Some("claude"));
        assert_eq!(config.backend_for(Role::Evaluator), Some("anthropic"));
        assert_eq!(config.model_for(Role::Generator), Some("sonnet"));
        assert_eq!(config.model_for(Role::Evaluator), Some("opus"));
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
        assert_eq!(config.deadline(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_threshold_layering() {
        let config = ProjectConfig::parse(FULL).unwrap();

        let base = config.thresholds(None).unwrap();
        assert_eq!(base, Thresholds::new(0.75, 0.8, 0.6));

        let production = config.thresholds(Some("production")).unwrap();
        assert_eq!(production, Thresholds::new(0.9, 0.9, 0.6));

        assert!(config.thresholds(Some("staging")).is_err());
    }

    #[test]
    fn test_partial_weights_fill_defaults() {
        let config = ProjectConfig::parse(FULL).unwrap();
        let weights = config.weights();
        assert_eq!(weights.preference, 0.5);
        assert_eq!(weights.constraint, 0.3);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProjectConfig::parse("").unwrap();
        assert_eq!(config.thresholds(None).unwrap(), Thresholds::default());
        assert_eq!(config.weights(), Weights::default());
        assert_eq!(config.backend_for(Role::Planner), None);
        assert_eq!(config.deadline(), None);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(ProjectConfig::parse("agent = \"claude\"").is_err());
        assert!(ProjectConfig::parse("[thresholds]\nstyle = 0.5").is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(ProjectConfig::parse("backend = \"gpt\"").is_err());
        assert!(ProjectConfig::parse("retry_attempts = 0").is_err());
        assert!(ProjectConfig::parse("deadline_secs = 9223372036854775807").is_err());
        assert!(ProjectConfig::parse("call_timeout_secs = 604801").is_err());
        assert!(ProjectConfig::parse("deadline_secs = 604800").is_ok());
        assert!(ProjectConfig::parse("[thresholds]\nconstraint = 1.2").is_err());
        assert!(ProjectConfig::parse("[weights]\nfactuality = -1.0").is_err());
        assert!(
            ProjectConfig::parse("[environments.prod.thresholds]\npreference = -0.1").is_err()
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "model = \"haiku\"").unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.model.as_deref(), Some("haiku"));
    }
}
