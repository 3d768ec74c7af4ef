use serde::{Serialize, Serializer};
use std::time::Duration;

use reforge_eval::{CodeModification, ModificationPlan, Verdict};

use crate::{PipelineError, Stage};

/// The final result of one modification attempt
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModifyResult {
    /// Every evaluated dimension met its threshold. Nothing has been
    /// persisted; applying the candidate is up to the caller.
    Accepted {
        candidate: CodeModification,
        verdict: Verdict,
        plan: ModificationPlan,
        duration_secs: f64,
    },
    /// The pipeline ran to completion and the verdict says no
    Rejected {
        verdict: Verdict,
        plan: ModificationPlan,
        candidate_summary: String,
        duration_secs: f64,
    },
    /// Pipeline infrastructure failure; no verdict was reached
    Failed {
        stage: Stage,
        #[serde(serialize_with = "serialize_error")]
        error: PipelineError,
        duration_secs: f64,
    },
}

fn serialize_error<S: Serializer>(error: &PipelineError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl ModifyResult {
    pub fn accepted(
        candidate: CodeModification,
        verdict: Verdict,
        plan: ModificationPlan,
        duration: Duration,
    ) -> Self {
        Self::Accepted {
            candidate,
            verdict,
            plan,
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn rejected(
        verdict: Verdict,
        plan: ModificationPlan,
        candidate_summary: String,
        duration: Duration,
    ) -> Self {
        Self::Rejected {
            verdict,
            plan,
            candidate_summary,
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn failed(stage: Stage, error: PipelineError, duration: Duration) -> Self {
        Self::Failed {
            stage,
            error,
            duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Accepted { verdict, .. } | Self::Rejected { verdict, .. } => Some(verdict),
            Self::Failed { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Accepted { .. } => 0,
            Self::Rejected { .. } => 1,
            Self::Failed { error, .. } if error.is_cancelled() => 130,
            Self::Failed { .. } => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_eval::{judge, Thresholds};

    fn plan() -> ModificationPlan {
        ModificationPlan {
            constraint_check_needed: false,
            factuality_check_needed: false,
            steps: vec![],
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_exit_codes() {
        let verdict = judge(&[], &Thresholds::default());
        let rejected = ModifyResult::rejected(verdict, plan(), "s".into(), Duration::ZERO);
        assert_eq!(rejected.exit_code(), 1);

        let cancelled =
            ModifyResult::failed(Stage::Generating, PipelineError::Cancelled, Duration::ZERO);
        assert_eq!(cancelled.exit_code(), 130);

        let timed_out = ModifyResult::failed(
            Stage::Evaluating,
            PipelineError::DeadlineExceeded(Duration::from_secs(1)),
            Duration::ZERO,
        );
        assert_eq!(timed_out.exit_code(), 2);
        assert!(timed_out.verdict().is_none());
    }

    #[test]
    fn test_failed_serializes_error_as_text() {
        let result = ModifyResult::failed(
            Stage::Planning,
            PipelineError::AlreadyInFlight("obj".into()),
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "planning");
        assert_eq!(
            json["error"],
            "A modification of 'obj' is already in progress"
        );
        assert_eq!(json["duration_secs"], 1.5);
    }
}
