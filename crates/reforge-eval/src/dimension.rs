use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One independent axis of code-quality evaluation.
///
/// Declaration order is the judging order: constraint, factuality, preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Constraint,
    Factuality,
    Preference,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [
        Dimension::Constraint,
        Dimension::Factuality,
        Dimension::Preference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Constraint => "constraint",
            Dimension::Factuality => "factuality",
            Dimension::Preference => "preference",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "constraint" | "constraints" => Ok(Dimension::Constraint),
            "factuality" | "factual" => Ok(Dimension::Factuality),
            "preference" | "preferences" => Ok(Dimension::Preference),
            _ => Err(format!("Unknown dimension: {}", s)),
        }
    }
}

/// Result of scoring a candidate along one dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionEvaluation {
    pub dimension: Dimension,
    /// Score in [0.0, 1.0]
    pub score: f64,
    /// Issues or weaknesses found
    #[serde(default)]
    pub issues: Vec<String>,
    /// Free-text rationale
    #[serde(default)]
    pub analysis: String,
    /// Strengths (preference only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strengths: Vec<String>,
    /// Set when the score is the safe-failure default rather than a real judgment
    #[serde(default)]
    pub evaluation_failed: bool,
}

impl DimensionEvaluation {
    pub fn new(dimension: Dimension, score: f64, issues: Vec<String>, analysis: String) -> Self {
        Self {
            dimension,
            score,
            issues,
            analysis,
            strengths: Vec::new(),
            evaluation_failed: false,
        }
    }

    pub fn with_strengths(mut self, strengths: Vec<String>) -> Self {
        self.strengths = strengths;
        self
    }

    /// Safe-failure-to-zero: an evaluation that could not be computed scores 0.0
    pub fn failed(dimension: Dimension, cause: impl fmt::Display) -> Self {
        Self {
            dimension,
            score: 0.0,
            issues: vec![format!("{} evaluation failed: {}", dimension, cause)],
            analysis: format!(
                "The {} check could not be completed, so the candidate is treated as failing it.",
                dimension
            ),
            strengths: Vec::new(),
            evaluation_failed: true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{dimension} threshold must be within [0.0, 1.0], got {value}")]
    ThresholdOutOfRange { dimension: Dimension, value: f64 },

    #[error("{dimension} weight must be a non-negative number, got {value}")]
    InvalidWeight { dimension: Dimension, value: f64 },
}

/// Minimum acceptable score per dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub constraint: f64,
    pub factuality: f64,
    pub preference: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            constraint: 0.7,
            factuality: 0.8,
            preference: 0.6,
        }
    }
}

impl Thresholds {
    pub fn new(constraint: f64, factuality: f64, preference: f64) -> Self {
        Self {
            constraint,
            factuality,
            preference,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Constraint => self.constraint,
            Dimension::Factuality => self.factuality,
            Dimension::Preference => self.preference,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        match dimension {
            Dimension::Constraint => self.constraint = value,
            Dimension::Factuality => self.factuality = value,
            Dimension::Preference => self.preference = value,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for dimension in Dimension::ALL {
            let value = self.get(dimension);
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { dimension, value });
            }
        }
        Ok(())
    }
}

/// Relative weight of each dimension in the overall score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub constraint: f64,
    pub factuality: f64,
    pub preference: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            constraint: 0.3,
            factuality: 0.3,
            preference: 0.4,
        }
    }
}

impl Weights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Constraint => self.constraint,
            Dimension::Factuality => self.factuality,
            Dimension::Preference => self.preference,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for dimension in Dimension::ALL {
            let value = self.get(dimension);
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { dimension, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_order_is_check_order() {
        let mut dims = vec![
            Dimension::Preference,
            Dimension::Constraint,
            Dimension::Factuality,
        ];
        dims.sort();
        assert_eq!(dims, Dimension::ALL.to_vec());
    }

    #[test]
    fn test_failed_evaluation_scores_zero() {
        let eval = DimensionEvaluation::failed(Dimension::Constraint, "model service down");
        assert_eq!(eval.score, 0.0);
        assert!(eval.evaluation_failed);
        assert_eq!(eval.issues.len(), 1);
        assert!(eval.issues[0].contains("model service down"));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Thresholds::default().validate().is_ok());
        let bad = Thresholds::new(1.2, 0.5, 0.5);
        assert_eq!(
            bad.validate(),
            Err(ConfigError::ThresholdOutOfRange {
                dimension: Dimension::Constraint,
                value: 1.2
            })
        );
        assert!(Thresholds::new(0.5, f64::NAN, 0.5).validate().is_err());
    }

    #[test]
    fn test_weight_validation() {
        assert!(Weights::default().validate().is_ok());
        let bad = Weights {
            preference: -0.1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_dimension_serde_names() {
        let json = serde_json::to_string(&Dimension::Factuality).unwrap();
        assert_eq!(json, "\"factuality\"");
        assert_eq!(
            "Constraints".parse::<Dimension>().unwrap(),
            Dimension::Constraint
        );
    }
}
