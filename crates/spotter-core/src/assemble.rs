//! Final response assembly.
//!
//! Whatever happens inside the pipeline, callers get exactly one
//! [`PlanResponse`]: a success envelope carrying the plan with its reports,
//! or a failure envelope carrying the failure kind and whatever diagnostic
//! payload the failing stage produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FailureKind, PlanError};
use crate::grounding::GroundingReport;
use crate::orchestrator::OrchestratorOutcome;
use crate::plan::Plan;
use crate::validator::{ValidationReport, Violation};
use spotter_evidence::IndexName;

/// The one response shape per plan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanResponse {
    Success(PlanSuccess),
    Failure(PlanFailure),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSuccess {
    pub request_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub plan: Plan,
    pub validation: ValidationReport,
    pub grounding: GroundingReport,
    pub attempts: u32,
    /// Indices that were down during retrieval; the plan stands on less
    /// evidence than usual.
    pub degraded_indices: Vec<IndexName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFailure {
    pub request_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub kind: FailureKind,
    pub message: String,
    /// Hard violations from the last rejected draft, when that is why we
    /// failed.
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Last grounding report, when grounding is why we failed.
    #[serde(default)]
    pub grounding: Option<GroundingReport>,
}

impl PlanResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Success(s) => s.request_id,
            Self::Failure(f) => f.request_id,
        }
    }
}

/// Wrap an accepted plan, stamping export readiness.
pub fn assemble_success(
    request_id: Uuid,
    mut outcome: OrchestratorOutcome,
    degraded_indices: Vec<IndexName>,
) -> PlanResponse {
    // Exporters refuse plans with hard violations, so the flags just mirror
    // that check.
    let exportable = !outcome.validation.has_hard();
    outcome.plan.export.excel_ready = exportable;
    outcome.plan.export.csv_ready = exportable;

    PlanResponse::Success(PlanSuccess {
        request_id,
        generated_at: Utc::now(),
        plan: outcome.plan,
        validation: outcome.validation,
        grounding: outcome.grounding,
        attempts: outcome.attempts,
        degraded_indices,
    })
}

/// Wrap a pipeline error, carrying stage-specific diagnostics along.
pub fn assemble_failure(request_id: Uuid, error: &PlanError) -> PlanResponse {
    let (violations, grounding) = match error {
        PlanError::RepairExhausted { violations, .. } => (violations.clone(), None),
        PlanError::GroundingInsufficient { report, .. } => (vec![], Some(report.clone())),
        _ => (vec![], None),
    };

    PlanResponse::Failure(PlanFailure {
        request_id,
        generated_at: Utc::now(),
        kind: error.kind(),
        message: error.to_string(),
        violations,
        grounding,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ExportFlags, NutritionTargets, TrainingBlock, TrainingDay};
    use crate::validator::{Severity, ViolationKind};

    fn outcome() -> OrchestratorOutcome {
        OrchestratorOutcome {
            plan: Plan {
                summary_text: "plan".to_owned(),
                assumptions: vec![],
                lift_plan: vec![TrainingDay {
                    week: 1,
                    day: 1,
                    deload: false,
                    blocks: vec![TrainingBlock {
                        exercise: "Back Squat".to_owned(),
                        muscle_group: "quads".to_owned(),
                        sets: 3,
                        reps: "5".to_owned(),
                        intensity: Some(75.0),
                        rest: None,
                        notes: None,
                        substitution: None,
                        evidence: vec![],
                    }],
                }],
                nutrition: NutritionTargets {
                    kcal: 2500.0,
                    protein_g: 150.0,
                    carb_g: 300.0,
                    fat_g: 70.0,
                    evidence: vec![],
                },
                progression_rules: String::new(),
                contraindications: vec![],
                citations: vec![],
                export: ExportFlags::default(),
            },
            grounding: GroundingReport::default(),
            validation: ValidationReport::default(),
            attempts: 1,
        }
    }

    #[test]
    fn success_stamps_export_flags_when_clean() {
        let response = assemble_success(Uuid::new_v4(), outcome(), vec![]);
        let PlanResponse::Success(success) = response else {
            panic!("expected success");
        };
        assert!(success.plan.export.excel_ready);
        assert!(success.plan.export.csv_ready);
    }

    #[test]
    fn success_withholds_export_flags_on_hard_violations() {
        let mut out = outcome();
        out.validation.violations.push(Violation {
            kind: ViolationKind::IntensityCapViolation {
                limit: 85.0,
                observed: 95.0,
            },
            severity: Severity::Hard,
            field: "lift_plan[0].blocks[0].intensity".to_owned(),
        });
        let response = assemble_success(Uuid::new_v4(), out, vec![]);
        let PlanResponse::Success(success) = response else {
            panic!("expected success");
        };
        assert!(!success.plan.export.excel_ready);
        assert!(!success.plan.export.csv_ready);
    }

    #[test]
    fn success_records_degraded_indices() {
        let response = assemble_success(Uuid::new_v4(), outcome(), vec![IndexName::Plans]);
        let PlanResponse::Success(success) = response else {
            panic!("expected success");
        };
        assert_eq!(success.degraded_indices, vec![IndexName::Plans]);
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let id = Uuid::new_v4();
        let response = assemble_failure(id, &PlanError::DeadlineExceeded);
        let PlanResponse::Failure(failure) = response else {
            panic!("expected failure");
        };
        assert_eq!(failure.request_id, id);
        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
        assert!(failure.violations.is_empty());
        assert!(failure.grounding.is_none());
    }

    #[test]
    fn repair_exhaustion_carries_violations() {
        let err = PlanError::RepairExhausted {
            max_repairs: 2,
            last_error: "cap".to_owned(),
            violations: vec![Violation {
                kind: ViolationKind::IntensityCapViolation {
                    limit: 85.0,
                    observed: 97.5,
                },
                severity: Severity::Hard,
                field: "lift_plan[0].blocks[0].intensity".to_owned(),
            }],
        };
        let PlanResponse::Failure(failure) = assemble_failure(Uuid::new_v4(), &err) else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::RepairExhausted);
        assert_eq!(failure.violations.len(), 1);
    }

    #[test]
    fn grounding_failure_carries_report() {
        let err = PlanError::GroundingInsufficient {
            ratio: 0.4,
            threshold: 0.95,
            attempts: 3,
            report: GroundingReport {
                total_claims: 5,
                grounded_claims: 2,
                ungrounded: vec![],
                stale_citations: vec![],
            },
        };
        let PlanResponse::Failure(failure) = assemble_failure(Uuid::new_v4(), &err) else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::GroundingInsufficient);
        assert_eq!(failure.grounding.as_ref().map(|g| g.total_claims), Some(5));
    }

    #[test]
    fn response_serde_round_trip_is_tagged() {
        let response = assemble_success(Uuid::new_v4(), outcome(), vec![]);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        let back: PlanResponse = serde_json::from_str(&json).unwrap();
        assert!(back.is_success());
        assert_eq!(back.request_id(), response.request_id());
    }
}
