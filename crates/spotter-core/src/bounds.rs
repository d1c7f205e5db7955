//! Externally supplied safety bounds.
//!
//! Bounds arrive as TOML written by coaching/medical reviewers and are pure
//! data: the validator reads them, the engine hard-codes none of them. A
//! missing table or entry means that dimension is unconstrained.
//!
//! ```toml
//! [volume.strength]
//! quads = { min = 4, max = 12 }
//!
//! [intensity.max_pct_1rm]
//! novice = 85.0
//!
//! [frequency]
//! high_intensity_pct = 85.0
//! default_min_rest_days = 1
//!
//! [nutrition]
//! protein_g_per_kg = { min = 1.6, max = 2.2 }
//!
//! [contraindications.shoulder_impingement]
//! disallowed = ["overhead press"]
//! substitutes = ["landmine press"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::{Goal, TrainedStatus};

#[derive(Debug, Error)]
pub enum BoundsError {
    #[error("failed to read bounds file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid bounds TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("bounds: {0}")]
    Invalid(String),
}

/// Inclusive range of weekly sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRange {
    pub min: u32,
    pub max: u32,
}

/// Inclusive band in grams per kilogram of body mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPerKg {
    pub min: f64,
    pub max: f64,
}

/// The full bounds document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundsConfig {
    /// Weekly set ranges per goal, then per muscle group.
    #[serde(default)]
    pub volume: BTreeMap<Goal, BTreeMap<String, SetRange>>,
    #[serde(default)]
    pub intensity: IntensityBounds,
    #[serde(default)]
    pub frequency: FrequencyBounds,
    #[serde(default)]
    pub nutrition: NutritionBounds,
    /// Keyed by condition, matched against `Profile::contraindications`.
    #[serde(default)]
    pub contraindications: BTreeMap<String, ContraRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntensityBounds {
    /// Ceiling on prescribed intensity (percent of 1RM) per trained status.
    #[serde(default)]
    pub max_pct_1rm: BTreeMap<TrainedStatus, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyBounds {
    /// A block counts as high-intensity at or above this percent of 1RM.
    pub high_intensity_pct: f64,
    /// Rest days required between high-intensity sessions, per muscle group.
    #[serde(default)]
    pub min_rest_days: BTreeMap<String, u32>,
    /// Fallback for muscle groups without a specific entry.
    #[serde(default)]
    pub default_min_rest_days: u32,
}

impl Default for FrequencyBounds {
    fn default() -> Self {
        Self {
            high_intensity_pct: 85.0,
            min_rest_days: BTreeMap::new(),
            default_min_rest_days: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutritionBounds {
    #[serde(default)]
    pub protein_g_per_kg: Option<BandPerKg>,
    #[serde(default)]
    pub fat_g_per_kg: Option<BandPerKg>,
    #[serde(default)]
    pub carb_g_per_kg: Option<BandPerKg>,
    /// Allowed relative gap, in percent, between stated kcal and the 4/4/9
    /// macro arithmetic. Absent means kcal consistency is not checked.
    #[serde(default)]
    pub kcal_tolerance_pct: Option<f64>,
}

/// What a medical condition rules out, and what may stand in for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContraRule {
    /// Case-insensitive substrings matched against exercise names.
    pub disallowed: Vec<String>,
    /// Approved replacements. Empty means any movement that is itself not
    /// disallowed may substitute.
    #[serde(default)]
    pub substitutes: Vec<String>,
    /// Protein ceiling override (g/kg) for this condition, e.g. renal cases.
    #[serde(default)]
    pub max_protein_g_per_kg: Option<f64>,
}

impl BoundsConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, BoundsError> {
        let config: BoundsConfig = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, BoundsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| BoundsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn check(&self) -> Result<(), BoundsError> {
        for (goal, groups) in &self.volume {
            for (group, range) in groups {
                if range.min > range.max {
                    return Err(BoundsError::Invalid(format!(
                        "volume.{goal}.{group}: min {} > max {}",
                        range.min, range.max
                    )));
                }
            }
        }
        for (status, cap) in &self.intensity.max_pct_1rm {
            if !(0.0..=120.0).contains(cap) {
                return Err(BoundsError::Invalid(format!(
                    "intensity.max_pct_1rm.{status}: {cap} out of 0..=120"
                )));
            }
        }
        if !(0.0..=120.0).contains(&self.frequency.high_intensity_pct) {
            return Err(BoundsError::Invalid(format!(
                "frequency.high_intensity_pct: {} out of 0..=120",
                self.frequency.high_intensity_pct
            )));
        }
        let bands = [
            ("protein_g_per_kg", self.nutrition.protein_g_per_kg),
            ("fat_g_per_kg", self.nutrition.fat_g_per_kg),
            ("carb_g_per_kg", self.nutrition.carb_g_per_kg),
        ];
        for (name, band) in bands {
            if let Some(band) = band {
                if band.min < 0.0 || band.min > band.max {
                    return Err(BoundsError::Invalid(format!(
                        "nutrition.{name}: band [{}, {}] is not ordered",
                        band.min, band.max
                    )));
                }
            }
        }
        if let Some(tolerance) = self.nutrition.kcal_tolerance_pct {
            if !(0.0..=100.0).contains(&tolerance) {
                return Err(BoundsError::Invalid(format!(
                    "nutrition.kcal_tolerance_pct: {tolerance} out of 0..=100"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
