use std::time::Duration;

use reforge_eval::{ConfigError, GenerationError, PlanningError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Planning(#[from] PlanningError),

    #[error("{0}")]
    Generation(#[from] GenerationError),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Modification attempt was cancelled")]
    Cancelled,

    #[error("Modification attempt exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("A modification of '{0}' is already in progress")]
    AlreadyInFlight(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
