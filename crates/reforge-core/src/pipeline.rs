use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reforge_eval::{
    CodeGenerator, ConstraintChecker, Dimension, DimensionEvaluation, FactualityChecker, Judger,
    Planner, PreferenceEvaluator, Thresholds, Verdict, Weights,
};
use reforge_logging::{AttemptJournal, LogEvent, Logger, RoleModels};
use reforge_model::StructuredClient;

use crate::{ModifyResult, ObjectSnapshot, PipelineError, Stage};

/// Model clients for each pipeline role
#[derive(Clone)]
pub struct StageClients {
    pub planner: StructuredClient,
    pub generator: StructuredClient,
    pub evaluator: StructuredClient,
}

impl StageClients {
    /// Use one client for every role
    pub fn shared(client: StructuredClient) -> Self {
        Self {
            planner: client.clone(),
            generator: client.clone(),
            evaluator: client,
        }
    }
}

/// Sequences Planner, Generator, the checkers and the Judger for one
/// modification attempt at a time.
pub struct ModificationPipeline {
    planner: Planner,
    generator: CodeGenerator,
    constraint: ConstraintChecker,
    factuality: FactualityChecker,
    preference: PreferenceEvaluator,
    judger: Judger,
    model_names: [String; 3],
    logger: Arc<Logger>,
    cancel: CancellationToken,
    deadline: Option<Duration>,
    journal_dir: Option<PathBuf>,
}

impl ModificationPipeline {
    pub fn new(clients: StageClients, logger: Arc<Logger>) -> Self {
        let model_names = [
            clients.planner.model_name().to_string(),
            clients.generator.model_name().to_string(),
            clients.evaluator.model_name().to_string(),
        ];
        Self {
            planner: Planner::new(clients.planner),
            generator: CodeGenerator::new(clients.generator),
            constraint: ConstraintChecker::new(clients.evaluator.clone()),
            factuality: FactualityChecker::new(clients.evaluator.clone()),
            preference: PreferenceEvaluator::new(clients.evaluator),
            judger: Judger::default(),
            model_names,
            logger,
            cancel: CancellationToken::new(),
            deadline: None,
            journal_dir: None,
        }
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.judger = Judger::new(weights);
        self
    }

    /// Bound the wall-clock time of a whole attempt
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Write an attempt journal into `dir` for every attempt
    pub fn with_journal_dir(mut self, dir: PathBuf) -> Self {
        self.journal_dir = Some(dir);
        self
    }

    /// Get a handle that cancels any running or future attempt
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one modification attempt against `snapshot`.
    ///
    /// The snapshot is only read. On `Accepted` the caller persists the
    /// candidate and bumps the version.
    pub async fn attempt(
        &self,
        snapshot: &ObjectSnapshot,
        prompt: &str,
        thresholds: &Thresholds,
    ) -> ModifyResult {
        let started = Instant::now();
        // A deadline too far out to represent is no deadline
        let deadline = self
            .deadline
            .and_then(|d| tokio::time::Instant::now().checked_add(d));
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let journal = self.open_journal(snapshot, prompt);

        self.logger.log(&LogEvent::AttemptStarted {
            attempt_id: attempt_id.clone(),
            object_id: snapshot.id.clone(),
            version: snapshot.version,
            prompt: prompt.to_string(),
        });
        if let Some(ref journal) = journal {
            journal.write_start(
                &attempt_id,
                &snapshot.id,
                snapshot.version,
                prompt,
                RoleModels {
                    planner: &self.model_names[0],
                    generator: &self.model_names[1],
                    evaluator: &self.model_names[2],
                },
            );
        }

        let result = self
            .run_stages(snapshot, prompt, thresholds, deadline, journal.as_ref())
            .await;

        let result = match result {
            Ok(result) => result,
            Err((stage, error)) => {
                warn!(stage = %stage, error = %error, "Modification attempt failed");
                self.logger.log(&LogEvent::AttemptFailed {
                    stage: stage.to_string(),
                    error: error.to_string(),
                });
                ModifyResult::failed(stage, error, started.elapsed())
            }
        };

        if let Some(ref journal) = journal {
            let verdict = result.verdict();
            let error = match &result {
                ModifyResult::Failed { error, .. } => Some(error.to_string()),
                _ => None,
            };
            journal.write_end(
                result.label(),
                verdict.map(|v| v.score),
                verdict.and_then(|v| v.rejection_reason.as_deref()),
                error.as_deref(),
                started.elapsed().as_secs_f64(),
            );
        }

        result
    }

    async fn run_stages(
        &self,
        snapshot: &ObjectSnapshot,
        prompt: &str,
        thresholds: &Thresholds,
        deadline: Option<tokio::time::Instant>,
        journal: Option<&AttemptJournal>,
    ) -> Result<ModifyResult, (Stage, PipelineError)> {
        let started = Instant::now();
        let fail = |stage: Stage| move |error: PipelineError| (stage, error);

        thresholds
            .validate()
            .map_err(|e| (Stage::Planning, PipelineError::from(e)))?;

        // Planning
        let stage_start = Instant::now();
        let plan = self
            .guarded(
                deadline,
                self.planner
                    .plan(&snapshot.code, snapshot.api_schema.as_deref(), prompt),
            )
            .await
            .map_err(fail(Stage::Planning))?
            .map_err(|e| (Stage::Planning, PipelineError::from(e)))?;

        self.logger.log(&LogEvent::PlanCreated {
            constraint_check_needed: plan.constraint_check_needed,
            factuality_check_needed: plan.factuality_check_needed,
            steps: plan.steps.len(),
            duration_secs: stage_start.elapsed().as_secs_f64(),
        });
        if let Some(journal) = journal {
            journal.write_plan(
                plan.constraint_check_needed,
                plan.factuality_check_needed,
                &plan.steps,
                &plan.reasoning,
            );
        }

        // Generating
        let stage_start = Instant::now();
        let candidate = self
            .guarded(
                deadline,
                self.generator.generate(&snapshot.code, prompt, &plan),
            )
            .await
            .map_err(fail(Stage::Generating))?
            .map_err(|e| (Stage::Generating, PipelineError::from(e)))?;

        self.logger.log(&LogEvent::CandidateGenerated {
            lines: candidate.line_count(),
            summary: candidate.short_summary(),
            duration_secs: stage_start.elapsed().as_secs_f64(),
        });
        if let Some(journal) = journal {
            journal.write_candidate(&candidate.modified_code, &candidate.modification_summary);
        }

        // Evaluating
        for (dimension, needed) in [
            (Dimension::Constraint, plan.constraint_check_needed),
            (Dimension::Factuality, plan.factuality_check_needed),
        ] {
            if !needed {
                debug!(dimension = %dimension, "Check not required by plan");
                self.logger.log(&LogEvent::CheckSkipped {
                    dimension: dimension.to_string(),
                });
            }
        }

        let original = snapshot.code.as_str();
        let candidate_code = candidate.modified_code.as_str();
        let constraint = async {
            if plan.constraint_check_needed {
                Some(
                    self.constraint
                        .check(original, candidate_code, snapshot.api_schema.as_deref())
                        .await,
                )
            } else {
                None
            }
        };
        let factuality = async {
            if plan.factuality_check_needed {
                Some(self.factuality.check(prompt, original, candidate_code).await)
            } else {
                None
            }
        };
        let preference = self.preference.evaluate(prompt, original, candidate_code);

        let (constraint, factuality, preference) = self
            .guarded(deadline, async {
                tokio::join!(constraint, factuality, preference)
            })
            .await
            .map_err(fail(Stage::Evaluating))?;

        let evaluations: Vec<DimensionEvaluation> = constraint
            .into_iter()
            .chain(factuality)
            .chain(std::iter::once(preference))
            .collect();

        for evaluation in &evaluations {
            self.logger.log(&LogEvent::DimensionEvaluated {
                dimension: evaluation.dimension.to_string(),
                score: evaluation.score,
                threshold: thresholds.get(evaluation.dimension),
                issues: evaluation.issues.len(),
                evaluation_failed: evaluation.evaluation_failed,
            });
            if let Some(journal) = journal {
                journal.write_evaluation(
                    evaluation.dimension.as_str(),
                    evaluation.score,
                    &evaluation.issues,
                    &evaluation.analysis,
                    evaluation.evaluation_failed,
                );
            }
        }

        // Judging
        if self.cancel.is_cancelled() {
            return Err((Stage::Judging, PipelineError::Cancelled));
        }
        let verdict = self.judger.judge(&evaluations, thresholds);
        self.log_verdict(&verdict, started);

        if verdict.accepted {
            Ok(ModifyResult::accepted(
                candidate,
                verdict,
                plan,
                started.elapsed(),
            ))
        } else {
            Ok(ModifyResult::rejected(
                verdict,
                plan,
                candidate.short_summary(),
                started.elapsed(),
            ))
        }
    }

    fn log_verdict(&self, verdict: &Verdict, started: Instant) {
        info!(
            accepted = verdict.accepted,
            score = verdict.score,
            "Verdict reached"
        );
        self.logger.log(&LogEvent::VerdictReached {
            accepted: verdict.accepted,
            score: verdict.score,
            rejection_reason: verdict.rejection_reason.clone(),
            duration_secs: started.elapsed().as_secs_f64(),
        });
    }

    /// Race a stage against cancellation and the attempt deadline
    async fn guarded<F: Future>(
        &self,
        deadline: Option<tokio::time::Instant>,
        stage: F,
    ) -> Result<F::Output, PipelineError> {
        let expiry = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            _ = expiry => Err(PipelineError::DeadlineExceeded(
                self.deadline.unwrap_or_default(),
            )),
            output = stage => Ok(output),
        }
    }

    fn open_journal(&self, snapshot: &ObjectSnapshot, prompt: &str) -> Option<AttemptJournal> {
        let dir = self.journal_dir.as_ref()?;
        match AttemptJournal::in_dir(dir, &snapshot.id, prompt) {
            Ok(journal) => {
                debug!(path = %journal.path().display(), "Attempt journal opened");
                Some(journal)
            }
            Err(e) => {
                warn!(error = %e, "Could not open attempt journal");
                None
            }
        }
    }
}
