//! Dimension checkers.
//!
//! Checkers never return an error: any failure to reach the model or to
//! decode its reply collapses into [`DimensionEvaluation::failed`], which
//! scores the dimension 0.0.

use reforge_model::{ModelError, StructuredClient};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{Dimension, DimensionEvaluation, PipelinePrompts};

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    score: f64,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    analysis: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    score: f64,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    analysis: String,
}

/// Reject scores the model cannot legitimately have produced
fn validate_score(score: f64) -> Result<f64, ModelError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(ModelError::MalformedResponse(format!(
            "score {} is outside [0.0, 1.0]",
            score
        )))
    }
}

fn settle(
    dimension: Dimension,
    result: Result<DimensionEvaluation, ModelError>,
) -> DimensionEvaluation {
    match result {
        Ok(evaluation) => {
            info!(
                dimension = %dimension,
                score = evaluation.score,
                issues = evaluation.issues.len(),
                "Dimension evaluated"
            );
            evaluation
        }
        Err(e) => {
            warn!(dimension = %dimension, error = %e, "Evaluation failed, scoring 0.0");
            DimensionEvaluation::failed(dimension, e)
        }
    }
}

async fn review(
    client: &StructuredClient,
    dimension: Dimension,
    prompt: &str,
) -> Result<DimensionEvaluation, ModelError> {
    debug!(dimension = %dimension, prompt_len = prompt.len(), "Running checker");
    let response: ReviewResponse = client.request(prompt).await?;
    let score = validate_score(response.score)?;
    Ok(DimensionEvaluation::new(
        dimension,
        score,
        response.issues,
        response.analysis,
    ))
}

/// Scores whether a candidate preserves declared interfaces and API schema
pub struct ConstraintChecker {
    client: StructuredClient,
}

impl ConstraintChecker {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    pub async fn check(
        &self,
        original_code: &str,
        candidate_code: &str,
        api_schema: Option<&str>,
    ) -> DimensionEvaluation {
        let prompt =
            PipelinePrompts::build_constraint_prompt(original_code, candidate_code, api_schema);
        settle(
            Dimension::Constraint,
            review(&self.client, Dimension::Constraint, &prompt).await,
        )
    }
}

/// Scores technical and algorithmic correctness of a candidate
pub struct FactualityChecker {
    client: StructuredClient,
}

impl FactualityChecker {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    pub async fn check(
        &self,
        request: &str,
        original_code: &str,
        candidate_code: &str,
    ) -> DimensionEvaluation {
        let prompt =
            PipelinePrompts::build_factuality_prompt(request, original_code, candidate_code);
        settle(
            Dimension::Factuality,
            review(&self.client, Dimension::Factuality, &prompt).await,
        )
    }
}

/// Scores a candidate against human-preference dimensions
pub struct PreferenceEvaluator {
    client: StructuredClient,
}

impl PreferenceEvaluator {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    pub async fn evaluate(
        &self,
        request: &str,
        original_code: &str,
        candidate_code: &str,
    ) -> DimensionEvaluation {
        let prompt =
            PipelinePrompts::build_preference_prompt(request, original_code, candidate_code);
        settle(Dimension::Preference, self.run(&prompt).await)
    }

    async fn run(&self, prompt: &str) -> Result<DimensionEvaluation, ModelError> {
        debug!(prompt_len = prompt.len(), "Running preference evaluator");
        let response: PreferenceResponse = self.client.request(prompt).await?;
        let score = validate_score(response.score)?;
        Ok(DimensionEvaluation::new(
            Dimension::Preference,
            score,
            response.weaknesses,
            response.analysis,
        )
        .with_strengths(response.strengths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_score_bounds() {
        assert_eq!(validate_score(0.0).unwrap(), 0.0);
        assert_eq!(validate_score(1.0).unwrap(), 1.0);
        assert!(validate_score(1.01).is_err());
        assert!(validate_score(-0.2).is_err());
        assert!(validate_score(f64::NAN).is_err());
    }

    #[test]
    fn test_settle_converts_errors_to_zero() {
        let evaluation = settle(
            Dimension::Factuality,
            Err(ModelError::Http("connection refused".into())),
        );
        assert_eq!(evaluation.score, 0.0);
        assert_eq!(evaluation.dimension, Dimension::Factuality);
        assert!(evaluation.evaluation_failed);
    }
}
