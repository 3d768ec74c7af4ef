//! # reforge-eval
//!
//! The stages of a modification attempt, short of orchestration:
//!
//! - [`Planner`] decides which checks a change needs
//! - [`CodeGenerator`] produces the candidate code body
//! - [`ConstraintChecker`], [`FactualityChecker`], [`PreferenceEvaluator`]
//!   score the candidate along independent [`Dimension`]s
//! - [`Judger`] turns the scores into a [`Verdict`]
//!
//! Checkers always return a [`DimensionEvaluation`]; a checker that cannot
//! reach its model scores 0.0 rather than erroring.

mod checkers;
mod dimension;
mod generator;
mod judger;
mod planner;
mod prompts;
mod types;

pub use checkers::{ConstraintChecker, FactualityChecker, PreferenceEvaluator};
pub use dimension::{ConfigError, Dimension, DimensionEvaluation, Thresholds, Weights};
pub use generator::{CodeGenerator, GenerationError};
pub use judger::{judge, DimensionFeedback, Judger, Verdict};
pub use planner::{Planner, PlanningError};
pub use prompts::{PipelinePrompts, MAX_OBJECT_LEN};
pub use types::{CodeModification, ModificationPlan, SuggestedTest};
