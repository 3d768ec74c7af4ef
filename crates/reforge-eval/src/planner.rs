use reforge_model::{ModelError, StructuredClient};
use thiserror::Error;
use tracing::{debug, info};

use crate::{ModificationPlan, PipelinePrompts, MAX_OBJECT_LEN};

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("Modification prompt is empty")]
    EmptyPrompt,

    #[error("Object code is {len} bytes, more than the {max} byte limit")]
    ObjectTooLarge { len: usize, max: usize },

    #[error("Planning failed: {0}")]
    Model(#[from] ModelError),
}

/// Decides which checks a modification needs and how to implement it
pub struct Planner {
    client: StructuredClient,
}

impl Planner {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    /// Produce a plan for `request` against the current code.
    ///
    /// `object_code` may be empty (new object) but not larger than
    /// [`MAX_OBJECT_LEN`]; `request` may not be empty.
    pub async fn plan(
        &self,
        object_code: &str,
        api_schema: Option<&str>,
        request: &str,
    ) -> Result<ModificationPlan, PlanningError> {
        if request.trim().is_empty() {
            return Err(PlanningError::EmptyPrompt);
        }
        if object_code.len() > MAX_OBJECT_LEN {
            return Err(PlanningError::ObjectTooLarge {
                len: object_code.len(),
                max: MAX_OBJECT_LEN,
            });
        }

        let prompt = PipelinePrompts::build_plan_prompt(object_code, api_schema, request);
        debug!(
            prompt_len = prompt.len(),
            model = self.client.model_name(),
            "Running planner"
        );

        let plan: ModificationPlan = self.client.request(&prompt).await?;

        info!(
            constraint_check = plan.constraint_check_needed,
            factuality_check = plan.factuality_check_needed,
            steps = plan.steps.len(),
            "Plan created"
        );

        Ok(plan)
    }
}
