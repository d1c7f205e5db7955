//! Core plan generation pipeline: requests and the canonical plan document,
//! prompt construction, the phase-gated generation orchestrator, citation
//! grounding, deterministic bounds validation, and response assembly.

pub mod assemble;
pub mod bounds;
pub mod error;
pub mod grounding;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod profile;
pub mod service;
pub mod validator;

pub use assemble::{PlanFailure, PlanResponse, PlanSuccess, assemble_failure, assemble_success};
pub use bounds::{BoundsConfig, BoundsError};
pub use error::{FailureKind, PlanError};
pub use grounding::{GroundingReport, apply_fallback, verify};
pub use model::{
    CommandModel, Completion, CompletionRequest, GenerationModel, ModelError, RetryPolicy,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorOutcome, Phase};
pub use plan::{Plan, SchemaError, parse_plan_json};
pub use profile::{Goal, PlanRequest, Profile, SexCategory, TrainedStatus};
pub use service::{PlanService, ServiceConfig};
pub use validator::{Severity, ValidationReport, Violation, ViolationKind, validate};
