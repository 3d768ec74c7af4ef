//! # reforge-core
//!
//! Orchestration of a single modification attempt:
//! Planning, then Generating, then Evaluating (checkers run concurrently),
//! then Judging. The result is a [`ModifyResult`]; nothing is persisted here.

mod context;
mod error;
mod inflight;
mod outcome;
mod pipeline;

pub use context::{ObjectSnapshot, Stage};
pub use error::PipelineError;
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use outcome::ModifyResult;
pub use pipeline::{ModificationPipeline, StageClients};
