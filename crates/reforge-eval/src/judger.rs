use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{Dimension, DimensionEvaluation, Thresholds, Weights};

/// Per-dimension detail carried by a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFeedback {
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub analysis: String,
}

/// Final accept/reject decision for one modification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub accepted: bool,
    /// Weighted average over the dimensions that were evaluated
    pub score: f64,
    /// Scores of the evaluated dimensions only
    pub scores: BTreeMap<Dimension, f64>,
    pub rejection_reason: Option<String>,
    pub feedback: BTreeMap<Dimension, DimensionFeedback>,
}

impl Verdict {
    /// Dimensions that fell below their threshold, in check order
    pub fn failed_dimensions(&self) -> Vec<Dimension> {
        self.feedback
            .iter()
            .filter(|(_, f)| !f.passed)
            .map(|(d, _)| *d)
            .collect()
    }

    /// Render scores and issues as guidance for whoever asked for the change
    pub fn guidance(&self) -> String {
        let mut out = String::new();
        if let Some(ref reason) = self.rejection_reason {
            out.push_str(reason);
            out.push('\n');
        }
        for (dimension, feedback) in &self.feedback {
            out.push_str(&format!(
                "- {}: {:.2} (threshold {:.2}) {}\n",
                dimension,
                feedback.score,
                feedback.threshold,
                if feedback.passed { "ok" } else { "FAILED" }
            ));
            for issue in &feedback.issues {
                out.push_str(&format!("    * {}\n", issue));
            }
        }
        out
    }
}

/// Combines dimension evaluations into a verdict.
///
/// A dimension that was not evaluated takes no part in the decision: it
/// cannot reject the change and it is left out of the weighted score.
#[derive(Debug, Clone, Copy, Default)]
pub struct Judger {
    weights: Weights,
}

impl Judger {
    pub fn new(weights: Weights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn judge(&self, evaluations: &[DimensionEvaluation], thresholds: &Thresholds) -> Verdict {
        // A repeated dimension keeps its lowest score
        let mut present: BTreeMap<Dimension, &DimensionEvaluation> = BTreeMap::new();
        for evaluation in evaluations {
            present
                .entry(evaluation.dimension)
                .and_modify(|existing| {
                    if evaluation.score < existing.score || evaluation.score.is_nan() {
                        *existing = evaluation;
                    }
                })
                .or_insert(evaluation);
        }

        let mut rejection_reason = None;
        let mut scores = BTreeMap::new();
        let mut feedback = BTreeMap::new();

        for (dimension, evaluation) in &present {
            let threshold = thresholds.get(*dimension);
            // NaN compares false, so it never passes
            let passed = evaluation.score >= threshold;

            if !passed && rejection_reason.is_none() {
                rejection_reason = Some(format!(
                    "{} score {:.2} is below the required threshold {:.2}",
                    dimension, evaluation.score, threshold
                ));
            }

            scores.insert(*dimension, evaluation.score);
            feedback.insert(
                *dimension,
                DimensionFeedback {
                    score: evaluation.score,
                    threshold,
                    passed,
                    issues: evaluation.issues.clone(),
                    strengths: evaluation.strengths.clone(),
                    analysis: evaluation.analysis.clone(),
                },
            );
        }

        let score = self.weighted_score(&scores);
        let accepted = rejection_reason.is_none();

        debug!(
            accepted,
            score,
            evaluated = scores.len(),
            "Verdict computed"
        );

        Verdict {
            accepted,
            score,
            scores,
            rejection_reason,
            feedback,
        }
    }

    fn weighted_score(&self, scores: &BTreeMap<Dimension, f64>) -> f64 {
        if scores.is_empty() {
            return 1.0;
        }

        let total_weight: f64 = scores.keys().map(|d| self.weights.get(*d)).sum();
        if total_weight <= 0.0 {
            return scores.values().sum::<f64>() / scores.len() as f64;
        }

        scores
            .iter()
            .map(|(d, s)| self.weights.get(*d) * s)
            .sum::<f64>()
            / total_weight
    }
}

/// Judge with the default weights
pub fn judge(evaluations: &[DimensionEvaluation], thresholds: &Thresholds) -> Verdict {
    Judger::default().judge(evaluations, thresholds)
}
