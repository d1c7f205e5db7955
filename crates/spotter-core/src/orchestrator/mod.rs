//! Schema-constrained generation with a bounded repair loop.
//!
//! One orchestrator run drives the phase graph in [`state`]: draft a plan,
//! gate it through schema, grounding, and constraint checks, and on any gate
//! failure spend one repair attempt regenerating with targeted feedback.
//! The repair budget is content-level; transport retries live inside the
//! model layer and never consume it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bounds::BoundsConfig;
use crate::error::PlanError;
use crate::grounding::{self, GroundingReport};
use crate::model::{
    CompletionRequest, GenerationModel, RetryPolicy, complete_with_retry,
};
use crate::plan::{Plan, parse_plan_json, prompt::build_prompt};
use crate::profile::PlanRequest;
use crate::validator::{self, Severity, ValidationReport, Violation};
use spotter_evidence::RetrievalSet;

pub mod state;

pub use state::Phase;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Regeneration attempts after the first, shared by all three gates.
    pub max_repairs: u32,
    /// Minimum grounded claim ratio for the soft-fallback path.
    pub grounding_threshold: f64,
    pub temperature: f64,
    pub max_tokens: u32,
    pub seed: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_repairs: 2,
            grounding_threshold: 0.95,
            temperature: 0.2,
            max_tokens: 4096,
            seed: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct OrchestratorOutcome {
    pub plan: Plan,
    pub grounding: GroundingReport,
    pub validation: ValidationReport,
    /// Model completions consumed, including the successful one.
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Repair feedback
// ---------------------------------------------------------------------------

/// Which gate rejected the draft, with enough detail to prompt a fix.
#[derive(Debug, Clone)]
pub enum RepairFeedback {
    Schema(String),
    Grounding(Vec<String>),
    Constraint(Vec<Violation>),
}

impl RepairFeedback {
    /// Render as prompt feedback lines.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Schema(detail) => vec![format!("schema: {detail}")],
            Self::Grounding(lines) => {
                lines.iter().map(|l| format!("grounding: {l}")).collect()
            }
            Self::Constraint(violations) => violations
                .iter()
                .map(|v| format!("constraint: {v}"))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase tracking
// ---------------------------------------------------------------------------

/// Walks the phase graph for one request, logging every transition.
struct PhaseTracker {
    current: Phase,
    request_id: Uuid,
}

impl PhaseTracker {
    fn new(request_id: Uuid) -> Self {
        Self {
            current: Phase::Draft,
            request_id,
        }
    }

    fn advance(&mut self, to: Phase) {
        debug_assert!(
            Phase::is_valid_transition(self.current, to),
            "invalid phase transition {} -> {to}",
            self.current
        );
        debug!(request_id = %self.request_id, from = %self.current, to = %to, "phase transition");
        self.current = to;
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    model: Arc<dyn GenerationModel>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn GenerationModel>, config: OrchestratorConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Generate one plan for `request` grounded in `context`.
    pub async fn generate(
        &self,
        request: &PlanRequest,
        bounds: &BoundsConfig,
        context: &RetrievalSet,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorOutcome, PlanError> {
        // No evidence means nothing could ever ground; don't burn a model
        // call finding that out.
        if context.is_empty() {
            warn!(request_id = %request.id, "empty retrieval context, refusing to generate");
            return Err(PlanError::GroundingInsufficient {
                ratio: 0.0,
                threshold: self.config.grounding_threshold,
                attempts: 0,
                report: GroundingReport::default(),
            });
        }

        let context_ids = context.context_ids();
        let max_attempts = self.config.max_repairs + 1;
        let mut tracker = PhaseTracker::new(request.id);
        let mut feedback: Vec<String> = Vec::new();
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PlanError::DeadlineExceeded);
            }

            // 1. Draft: one model completion, with transport retry.
            let prompt = build_prompt(request, context, &feedback);
            let mut completion_req = CompletionRequest::new(prompt);
            completion_req.temperature = self.config.temperature;
            completion_req.max_tokens = self.config.max_tokens;
            completion_req.seed = self.config.seed;
            let completion = complete_with_retry(
                self.model.as_ref(),
                &completion_req,
                &self.config.retry,
                cancel,
            )
            .await?;
            attempts += 1;

            // 2. Schema gate.
            tracker.advance(Phase::SchemaCheck);
            let mut plan = match parse_plan_json(&completion.text) {
                Ok(plan) => plan,
                Err(err) => {
                    let rejection = RepairFeedback::Schema(err.to_string());
                    if attempts >= max_attempts {
                        tracker.advance(Phase::Repair);
                        tracker.advance(Phase::Failed);
                        return Err(PlanError::RepairExhausted {
                            max_repairs: self.config.max_repairs,
                            last_error: err.to_string(),
                            violations: vec![],
                        });
                    }
                    feedback = self.divert_to_repair(&mut tracker, attempts, rejection);
                    continue;
                }
            };

            // 3. Grounding gate.
            tracker.advance(Phase::GroundingCheck);
            let mut grounding = grounding::verify(&plan, &context_ids);
            if !grounding.is_fully_grounded() {
                if grounding.ratio() >= self.config.grounding_threshold {
                    // Close enough: strip what cannot be verified and keep
                    // the plan, rather than spending a repair.
                    let downgraded = grounding::apply_fallback(&mut plan, &context_ids);
                    info!(
                        request_id = %request.id,
                        downgraded,
                        ratio = grounding.ratio(),
                        "grounding fallback applied"
                    );
                    grounding = grounding::verify(&plan, &context_ids);
                } else {
                    let rejection = RepairFeedback::Grounding(grounding.feedback_lines());
                    if attempts >= max_attempts {
                        tracker.advance(Phase::Repair);
                        tracker.advance(Phase::Failed);
                        return Err(PlanError::GroundingInsufficient {
                            ratio: grounding.ratio(),
                            threshold: self.config.grounding_threshold,
                            attempts,
                            report: grounding,
                        });
                    }
                    feedback = self.divert_to_repair(&mut tracker, attempts, rejection);
                    continue;
                }
            }

            // 4. Constraint gate.
            tracker.advance(Phase::ConstraintCheck);
            let validation = validator::validate(&plan, &request.profile, bounds);
            if validation.has_hard() {
                let hard: Vec<Violation> = validation
                    .violations
                    .iter()
                    .filter(|v| v.severity == Severity::Hard)
                    .cloned()
                    .collect();
                let rejection = RepairFeedback::Constraint(hard.clone());
                if attempts >= max_attempts {
                    tracker.advance(Phase::Repair);
                    tracker.advance(Phase::Failed);
                    let last_error = hard
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(PlanError::RepairExhausted {
                        max_repairs: self.config.max_repairs,
                        last_error,
                        violations: hard,
                    });
                }
                feedback = self.divert_to_repair(&mut tracker, attempts, rejection);
                continue;
            }

            tracker.advance(Phase::Final);
            info!(
                request_id = %request.id,
                attempts,
                blocks = plan.block_count(),
                grounded = grounding.grounded_claims,
                soft_violations = validation.violations.len(),
                "plan accepted"
            );
            return Ok(OrchestratorOutcome {
                plan,
                grounding,
                validation,
                attempts,
            });
        }
    }

    fn divert_to_repair(
        &self,
        tracker: &mut PhaseTracker,
        attempts: u32,
        rejection: RepairFeedback,
    ) -> Vec<String> {
        let lines = rejection.lines();
        info!(
            request_id = %tracker.request_id,
            attempt = attempts,
            issues = lines.len(),
            "draft rejected, regenerating with feedback"
        );
        tracker.advance(Phase::Repair);
        tracker.advance(Phase::Draft);
        lines
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Completion, ModelError};
    use crate::profile::{Goal, Profile, SexCategory, TrainedStatus};
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl GenerationModel for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }

        async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, ModelError> {
            panic!("model must not be called");
        }
    }

    fn request() -> PlanRequest {
        PlanRequest::new(
            Profile {
                bodymass_kg: 80.0,
                trained_status: TrainedStatus::Novice,
                goals: vec![Goal::Strength],
                sex: SexCategory::Unspecified,
                age_range: None,
                contraindications: vec![],
                equipment: vec![],
                training_age_years: None,
            },
            3,
            4,
        )
    }

    #[tokio::test]
    async fn empty_context_fails_before_any_model_call() {
        let orch = Orchestrator::new(Arc::new(NeverCalled), OrchestratorConfig::default());
        let err = orch
            .generate(
                &request(),
                &BoundsConfig::default(),
                &RetrievalSet::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            PlanError::GroundingInsufficient { ratio, attempts, .. } => {
                assert_eq!(ratio, 0.0);
                assert_eq!(attempts, 0);
            }
            other => panic!("expected GroundingInsufficient, got {other:?}"),
        }
    }

    #[test]
    fn feedback_lines_are_prefixed_by_gate() {
        let schema = RepairFeedback::Schema("no JSON object".to_owned());
        assert_eq!(schema.lines(), vec!["schema: no JSON object"]);

        let grounding = RepairFeedback::Grounding(vec![
            "nutrition: cites no evidence".to_owned(),
        ]);
        assert_eq!(
            grounding.lines(),
            vec!["grounding: nutrition: cites no evidence"]
        );
    }

    #[test]
    fn tracker_walks_the_happy_path() {
        let mut tracker = PhaseTracker::new(Uuid::new_v4());
        tracker.advance(Phase::SchemaCheck);
        tracker.advance(Phase::GroundingCheck);
        tracker.advance(Phase::ConstraintCheck);
        tracker.advance(Phase::Final);
        assert!(tracker.current.is_terminal());
    }

    #[test]
    #[should_panic(expected = "invalid phase transition")]
    fn tracker_rejects_gate_skips_in_debug() {
        let mut tracker = PhaseTracker::new(Uuid::new_v4());
        tracker.advance(Phase::Final);
    }
}
