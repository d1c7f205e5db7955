//! Generation attempt state machine.
//!
//! Each attempt walks Draft through the three check gates; any gate can
//! divert to Repair, which either loops back to Draft (budget remaining) or
//! lands in Failed. Final and Failed are terminal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Draft,
    SchemaCheck,
    GroundingCheck,
    ConstraintCheck,
    Repair,
    Final,
    Failed,
}

impl Phase {
    /// Whether `from -> to` is an edge of the phase graph.
    pub fn is_valid_transition(from: Phase, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (from, to),
            (Draft, SchemaCheck)
                | (SchemaCheck, GroundingCheck)
                | (SchemaCheck, Repair)
                | (GroundingCheck, ConstraintCheck)
                | (GroundingCheck, Repair)
                | (ConstraintCheck, Final)
                | (ConstraintCheck, Repair)
                | (Repair, Draft)
                | (Repair, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Final | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::SchemaCheck => "schema_check",
            Self::GroundingCheck => "grounding_check",
            Self::ConstraintCheck => "constraint_check",
            Self::Repair => "repair",
            Self::Final => "final",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for Phase {
    type Err = PhaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "schema_check" => Ok(Self::SchemaCheck),
            "grounding_check" => Ok(Self::GroundingCheck),
            "constraint_check" => Ok(Self::ConstraintCheck),
            "repair" => Ok(Self::Repair),
            "final" => Ok(Self::Final),
            "failed" => Ok(Self::Failed),
            other => Err(PhaseParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Phase`] string.
#[derive(Debug, Clone)]
pub struct PhaseParseError(pub String);

impl fmt::Display for PhaseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid phase: {:?}", self.0)
    }
}

impl std::error::Error for PhaseParseError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
