use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use reforge_eval::{
    CodeGenerator, ConstraintChecker, Dimension, FactualityChecker, GenerationError,
    ModificationPlan, Planner, PlanningError, PreferenceEvaluator, MAX_OBJECT_LEN,
};
use reforge_model::{
    LanguageModel, ModelConfig, ModelError, ModelKind, ModelOutput, RetryPolicy,
    StructuredClient,
};

/// Always answers with the same text, or always fails
struct FixedModel {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl FixedModel {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguageModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::ClaudeCli
    }

    async fn complete(
        &self,
        _prompt: &str,
        _config: &ModelConfig,
    ) -> Result<ModelOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some(ref text) => Ok(ModelOutput::new(text.clone(), String::new(), 0, Duration::ZERO)),
            None => Err(ModelError::Http("connection refused".into())),
        }
    }

    async fn is_available(&self) -> bool {
        self.reply.is_some()
    }
}

fn client(model: Arc<FixedModel>) -> StructuredClient {
    StructuredClient::new(model, ModelConfig::default())
        .with_retry_policy(RetryPolicy::new(2).with_base_delay(Duration::ZERO))
}

fn plan() -> ModificationPlan {
    ModificationPlan {
        constraint_check_needed: true,
        factuality_check_needed: true,
        steps: vec!["do it".into()],
        reasoning: String::new(),
    }
}

#[tokio::test]
async fn test_planner_rejects_blank_prompt_without_calling_model() {
    let model = FixedModel::replying("{}");
    let planner = Planner::new(client(model.clone()));
    let result = planner.plan("fn a() {}", None, "   ").await;
    assert!(matches!(result, Err(PlanningError::EmptyPrompt)));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_planner_accepts_empty_object_code() {
    let model = FixedModel::replying(
        r#"<response>{"status":"ok","constraint_check_needed":false,"factuality_check_needed":true,"plan":["write it"],"reasoning":"new object"}</response>"#,
    );
    let planner = Planner::new(client(model));
    let plan = planner.plan("", None, "create a counter").await.unwrap();
    assert!(!plan.constraint_check_needed);
    assert!(plan.factuality_check_needed);
    assert_eq!(plan.steps, vec!["write it"]);
}

#[tokio::test]
async fn test_planner_transport_failure_is_planning_error() {
    let model = FixedModel::down();
    let planner = Planner::new(client(model.clone()));
    let result = planner.plan("fn a() {}", None, "rename a").await;
    assert!(matches!(result, Err(PlanningError::Model(ModelError::Http(_)))));
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_generator_rejects_empty_candidate() {
    let model = FixedModel::replying(r#"{"modified_code": "   ", "modification_summary": "x"}"#);
    let generator = CodeGenerator::new(client(model));
    let result = generator.generate("fn a() {}", "rename a", &plan()).await;
    assert!(matches!(result, Err(GenerationError::EmptyCandidate)));
}

#[tokio::test]
async fn test_oversized_object_fails_before_any_model_call() {
    let code = "// filler line\n".repeat(MAX_OBJECT_LEN / 10);
    assert!(code.len() > MAX_OBJECT_LEN);

    let model = FixedModel::replying(r#"{"modified_code": "fn a() {}"}"#);
    let planner = Planner::new(client(model.clone()));
    let planned = planner.plan(&code, None, "rename a").await;
    assert!(matches!(planned, Err(PlanningError::ObjectTooLarge { .. })));

    let generator = CodeGenerator::new(client(model.clone()));
    let generated = generator.generate(&code, "rename a", &plan()).await;
    assert!(matches!(
        generated,
        Err(GenerationError::ObjectTooLarge { len, max })
            if len == code.len() && max == MAX_OBJECT_LEN
    ));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_checkers_fail_safe_to_zero_when_model_is_down() {
    let model = FixedModel::down();
    let constraint = ConstraintChecker::new(client(model.clone()))
        .check("fn a() {}", "fn b() {}", None)
        .await;
    let factuality = FactualityChecker::new(client(model.clone()))
        .check("rename", "fn a() {}", "fn b() {}")
        .await;
    let preference = PreferenceEvaluator::new(client(model))
        .evaluate("rename", "fn a() {}", "fn b() {}")
        .await;

    for (evaluation, dimension) in [
        (constraint, Dimension::Constraint),
        (factuality, Dimension::Factuality),
        (preference, Dimension::Preference),
    ] {
        assert_eq!(evaluation.dimension, dimension);
        assert_eq!(evaluation.score, 0.0);
        assert!(evaluation.evaluation_failed);
        assert!(!evaluation.issues.is_empty());
        assert!(!evaluation.analysis.is_empty());
    }
}

#[tokio::test]
async fn test_out_of_range_score_fails_safe() {
    let model = FixedModel::replying(r#"{"score": 7, "issues": []}"#);
    let evaluation = ConstraintChecker::new(client(model))
        .check("fn a() {}", "fn a() {}", None)
        .await;
    assert_eq!(evaluation.score, 0.0);
    assert!(evaluation.evaluation_failed);
}

#[tokio::test]
async fn test_preference_keeps_strengths_and_weaknesses() {
    let model = FixedModel::replying(
        r#"<response>{"status":"ok","score":0.75,"strengths":["clear names"],"weaknesses":["no docs"],"analysis":"fine"}</response>"#,
    );
    let evaluation = PreferenceEvaluator::new(client(model))
        .evaluate("rename", "fn a() {}", "fn b() {}")
        .await;
    assert_eq!(evaluation.score, 0.75);
    assert_eq!(evaluation.strengths, vec!["clear names"]);
    assert_eq!(evaluation.issues, vec!["no docs"]);
    assert!(!evaluation.evaluation_failed);
}
