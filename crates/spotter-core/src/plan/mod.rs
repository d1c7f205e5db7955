//! The canonical plan document.
//!
//! This is the one JSON contract shared by the generation model, the
//! grounding verifier, the bounds validator, and downstream exporters.
//! Field names and nesting are stable; exporters rely on them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use spotter_evidence::ChunkId;

pub mod parser;
pub mod prompt;

pub use parser::{SchemaError, extract_json_object, parse_plan_json};

/// A complete generated plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub summary_text: String,
    /// Gaps the model had to paper over, stated explicitly.
    #[serde(default)]
    pub assumptions: Vec<String>,
    pub lift_plan: Vec<TrainingDay>,
    pub nutrition: NutritionTargets,
    #[serde(default)]
    pub progression_rules: String,
    #[serde(default)]
    pub contraindications: Vec<String>,
    /// Bibliography: every chunk cited anywhere in the plan, once each.
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub export: ExportFlags,
}

/// One training session, addressed by (week, day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDay {
    /// 1-based week number.
    pub week: u32,
    /// 1-based day within the week.
    pub day: u32,
    #[serde(default)]
    pub deload: bool,
    pub blocks: Vec<TrainingBlock>,
}

/// One exercise prescription inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBlock {
    pub exercise: String,
    pub muscle_group: String,
    pub sets: u32,
    /// Rep prescription as written, e.g. `"5"` or `"6-8"`.
    pub reps: String,
    /// Working intensity as percent of one-rep max.
    #[serde(default)]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub rest: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Safe replacement movement for trainees whose contraindications rule
    /// out `exercise`.
    #[serde(default)]
    pub substitution: Option<String>,
    /// Chunk ids supporting this prescription.
    #[serde(default)]
    pub evidence: Vec<ChunkId>,
}

/// Daily nutrition prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionTargets {
    pub kcal: f64,
    pub protein_g: f64,
    pub carb_g: f64,
    pub fat_g: f64,
    #[serde(default)]
    pub evidence: Vec<ChunkId>,
}

/// One bibliography entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    pub chunk_id: ChunkId,
}

/// Downstream export readiness, stamped at assembly time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExportFlags {
    #[serde(default)]
    pub excel_ready: bool,
    #[serde(default)]
    pub csv_ready: bool,
}

impl Plan {
    /// Claim units for grounding: every training block plus the nutrition
    /// prescription, each addressed by its field path.
    pub fn claims(&self) -> Vec<(String, &[ChunkId])> {
        let mut claims = Vec::with_capacity(self.block_count() + 1);
        for (di, day) in self.lift_plan.iter().enumerate() {
            for (bi, block) in day.blocks.iter().enumerate() {
                claims.push((
                    format!("lift_plan[{di}].blocks[{bi}]"),
                    block.evidence.as_slice(),
                ));
            }
        }
        claims.push(("nutrition".to_owned(), self.nutrition.evidence.as_slice()));
        claims
    }

    pub fn block_count(&self) -> usize {
        self.lift_plan.iter().map(|d| d.blocks.len()).sum()
    }

    /// Weeks in which any day is flagged as a deload.
    pub fn deload_weeks(&self) -> BTreeSet<u32> {
        self.lift_plan
            .iter()
            .filter(|d| d.deload)
            .map(|d| d.week)
            .collect()
    }

    pub fn citation_ids(&self) -> BTreeSet<&ChunkId> {
        self.citations.iter().map(|c| &c.chunk_id).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
