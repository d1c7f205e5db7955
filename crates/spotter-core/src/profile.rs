//! Trainee profiles and plan requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Primary training goal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Strength,
    Hypertrophy,
    FatLoss,
    Endurance,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strength => "strength",
            Self::Hypertrophy => "hypertrophy",
            Self::FatLoss => "fat_loss",
            Self::Endurance => "endurance",
        };
        f.write_str(s)
    }
}

impl FromStr for Goal {
    type Err = GoalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strength" => Ok(Self::Strength),
            "hypertrophy" => Ok(Self::Hypertrophy),
            "fat_loss" => Ok(Self::FatLoss),
            "endurance" => Ok(Self::Endurance),
            other => Err(GoalParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Goal`] string.
#[derive(Debug, Clone)]
pub struct GoalParseError(pub String);

impl fmt::Display for GoalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid goal: {:?}", self.0)
    }
}

impl std::error::Error for GoalParseError {}

/// How far along the trainee is; drives intensity caps among other bounds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrainedStatus {
    Novice,
    Intermediate,
    Advanced,
}

impl fmt::Display for TrainedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Novice => "novice",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for TrainedStatus {
    type Err = TrainedStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "novice" => Ok(Self::Novice),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(TrainedStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TrainedStatus`] string.
#[derive(Debug, Clone)]
pub struct TrainedStatusParseError(pub String);

impl fmt::Display for TrainedStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid trained status: {:?}", self.0)
    }
}

impl std::error::Error for TrainedStatusParseError {}

/// Sex category, as far as it matters for nutrition guardrails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SexCategory {
    Female,
    Male,
    #[default]
    Unspecified,
}

impl fmt::Display for SexCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Female => "female",
            Self::Male => "male",
            Self::Unspecified => "unspecified",
        };
        f.write_str(s)
    }
}

impl FromStr for SexCategory {
    type Err = SexCategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "female" => Ok(Self::Female),
            "male" => Ok(Self::Male),
            "unspecified" => Ok(Self::Unspecified),
            other => Err(SexCategoryParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`SexCategory`] string.
#[derive(Debug, Clone)]
pub struct SexCategoryParseError(pub String);

impl fmt::Display for SexCategoryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid sex category: {:?}", self.0)
    }
}

impl std::error::Error for SexCategoryParseError {}

/// Inclusive age band, in years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

// ---------------------------------------------------------------------------
// Profile and request
// ---------------------------------------------------------------------------

/// Who the plan is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub bodymass_kg: f64,
    pub trained_status: TrainedStatus,
    /// Goals in priority order; the first drives volume targets.
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub sex: SexCategory,
    #[serde(default)]
    pub age_range: Option<AgeRange>,
    /// Condition keys matched against the bounds contraindication table,
    /// e.g. `"shoulder_impingement"`.
    #[serde(default)]
    pub contraindications: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub training_age_years: Option<f64>,
}

/// One plan generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub profile: Profile,
    #[serde(default = "default_frequency")]
    pub frequency_days_per_week: u8,
    #[serde(default = "default_weeks")]
    pub weeks: u8,
    /// Free-text constraints fed verbatim to the prompt, e.g.
    /// `"no barbell before 6am"`.
    #[serde(default)]
    pub constraints: Vec<String>,
}

fn default_frequency() -> u8 {
    3
}

fn default_weeks() -> u8 {
    4
}

impl PlanRequest {
    pub fn new(profile: Profile, frequency_days_per_week: u8, weeks: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile,
            frequency_days_per_week,
            weeks,
            constraints: Vec::new(),
        }
    }

    /// The evidence query for this request. Deterministic so retrieval, and
    /// therefore the whole pipeline, is replayable from the request alone.
    pub fn retrieval_query(&self) -> String {
        let goals = self
            .profile
            .goals
            .iter()
            .map(Goal::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let mut query = format!(
            "{goals} training program {status} {days} days per week volume intensity progression nutrition protein",
            status = self.profile.trained_status,
            days = self.frequency_days_per_week,
        );
        for condition in &self.profile.contraindications {
            query.push(' ');
            query.push_str(condition);
        }
        query
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
