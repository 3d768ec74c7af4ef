use reforge_model::{ModelError, StructuredClient};
use thiserror::Error;
use tracing::{debug, info};

use crate::{CodeModification, ModificationPlan, PipelinePrompts, MAX_OBJECT_LEN};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator returned an empty code body")]
    EmptyCandidate,

    #[error("Object code is {len} bytes, more than the {max} byte limit")]
    ObjectTooLarge { len: usize, max: usize },

    #[error("Code generation failed: {0}")]
    Model(#[from] ModelError),
}

/// Produces a candidate replacement code body from the plan
pub struct CodeGenerator {
    client: StructuredClient,
}

impl CodeGenerator {
    pub fn new(client: StructuredClient) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        object_code: &str,
        request: &str,
        plan: &ModificationPlan,
    ) -> Result<CodeModification, GenerationError> {
        if object_code.len() > MAX_OBJECT_LEN {
            return Err(GenerationError::ObjectTooLarge {
                len: object_code.len(),
                max: MAX_OBJECT_LEN,
            });
        }

        let prompt = PipelinePrompts::build_generation_prompt(object_code, request, plan);
        debug!(
            prompt_len = prompt.len(),
            model = self.client.model_name(),
            "Running generator"
        );

        let candidate: CodeModification = self.client.request(&prompt).await?;

        if candidate.modified_code.trim().is_empty() {
            return Err(GenerationError::EmptyCandidate);
        }

        info!(
            lines = candidate.line_count(),
            risks = candidate.risks.len(),
            suggested_tests = candidate.suggested_tests.len(),
            "Candidate generated"
        );

        Ok(candidate)
    }
}
