//! Pipeline failure taxonomy.
//!
//! Every way a plan request can fail maps to exactly one [`FailureKind`],
//! which is what callers and response payloads see. [`PlanError`] carries
//! the detail behind each kind.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grounding::GroundingReport;
use crate::model::ModelError;
use crate::validator::Violation;
use spotter_evidence::RetrievalError;

/// Stable machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RetrievalUnavailable,
    GroundingInsufficient,
    RepairExhausted,
    GenerationUnavailable,
    DeadlineExceeded,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RetrievalUnavailable => "retrieval_unavailable",
            Self::GroundingInsufficient => "grounding_insufficient",
            Self::RepairExhausted => "repair_exhausted",
            Self::GenerationUnavailable => "generation_unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(s)
    }
}

/// Errors terminating one plan request.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Every repair attempt was spent and the last draft was still bad.
    #[error("repair budget of {max_repairs} exhausted: {last_error}")]
    RepairExhausted {
        max_repairs: u32,
        last_error: String,
        violations: Vec<Violation>,
    },

    /// The grounded share never reached the acceptance threshold.
    #[error("grounding ratio {ratio:.2} below threshold {threshold:.2} after {attempts} attempts")]
    GroundingInsufficient {
        ratio: f64,
        threshold: f64,
        attempts: u32,
        report: GroundingReport,
    },

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl PlanError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Retrieval(_) => FailureKind::RetrievalUnavailable,
            Self::Model(_) => FailureKind::GenerationUnavailable,
            Self::RepairExhausted { .. } => FailureKind::RepairExhausted,
            Self::GroundingInsufficient { .. } => FailureKind::GroundingInsufficient,
            Self::DeadlineExceeded => FailureKind::DeadlineExceeded,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
