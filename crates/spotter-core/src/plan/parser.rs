//! Parse raw model output into a structurally sound [`Plan`].
//!
//! Models wrap JSON in prose or code fences no matter how firmly the prompt
//! forbids it, so extraction slices from the first `{` to the last `}`
//! before deserializing. Structural checks beyond what serde enforces
//! (week numbering, set counts, citation consistency) report the offending
//! field path, which feeds straight into repair prompts.

use std::collections::BTreeSet;

use thiserror::Error;

use spotter_evidence::ChunkId;

use super::Plan;

/// Errors produced while turning model output into a [`Plan`].
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lift_plan: plan has no training days")]
    NoTrainingDays,

    #[error("{path}: training day has no blocks")]
    EmptyDay { path: String },

    #[error("{path}: week must be >= 1")]
    InvalidWeekNumber { path: String },

    #[error("{path}: day must be in 1..=7, got {day}")]
    InvalidDayNumber { path: String, day: u32 },

    #[error("{path}: sets must be >= 1")]
    InvalidSets { path: String },

    #[error("{path}: reps must be non-empty")]
    EmptyReps { path: String },

    #[error("{path}: intensity {value} is not a usable percent of 1RM")]
    InvalidIntensity { path: String, value: f64 },

    #[error("nutrition.{field}: must be positive, got {value}")]
    InvalidNutrition { field: &'static str, value: f64 },

    #[error("citations[{index}]: duplicate chunk id {chunk_id}")]
    DuplicateCitation { index: usize, chunk_id: ChunkId },

    #[error("{path}: evidence {chunk_id} is not listed in citations")]
    UnlistedEvidence { path: String, chunk_id: ChunkId },
}

/// Slice `raw` from the first `{` to the last `}`.
///
/// Returns `None` when no such object-shaped region exists.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Parse model output into a [`Plan`], enforcing structural invariants.
pub fn parse_plan_json(raw: &str) -> Result<Plan, SchemaError> {
    let json = extract_json_object(raw).ok_or(SchemaError::NoJsonObject)?;
    let plan: Plan = serde_json::from_str(json)?;
    check_structure(&plan)?;
    Ok(plan)
}

fn check_structure(plan: &Plan) -> Result<(), SchemaError> {
    if plan.lift_plan.is_empty() {
        return Err(SchemaError::NoTrainingDays);
    }

    for (di, day) in plan.lift_plan.iter().enumerate() {
        let day_path = format!("lift_plan[{di}]");
        if day.week == 0 {
            return Err(SchemaError::InvalidWeekNumber { path: day_path });
        }
        if day.day == 0 || day.day > 7 {
            return Err(SchemaError::InvalidDayNumber {
                path: day_path,
                day: day.day,
            });
        }
        if day.blocks.is_empty() {
            return Err(SchemaError::EmptyDay { path: day_path });
        }
        for (bi, block) in day.blocks.iter().enumerate() {
            let block_path = format!("lift_plan[{di}].blocks[{bi}]");
            if block.sets == 0 {
                return Err(SchemaError::InvalidSets { path: block_path });
            }
            if block.reps.trim().is_empty() {
                return Err(SchemaError::EmptyReps { path: block_path });
            }
            if let Some(value) = block.intensity {
                // Above 120% of 1RM is a transcription error, not overload.
                if !value.is_finite() || value <= 0.0 || value > 120.0 {
                    return Err(SchemaError::InvalidIntensity {
                        path: format!("{block_path}.intensity"),
                        value,
                    });
                }
            }
        }
    }

    let macros = [
        ("kcal", plan.nutrition.kcal),
        ("protein_g", plan.nutrition.protein_g),
        ("carb_g", plan.nutrition.carb_g),
        ("fat_g", plan.nutrition.fat_g),
    ];
    for (field, value) in macros {
        if !value.is_finite() || value <= 0.0 {
            return Err(SchemaError::InvalidNutrition { field, value });
        }
    }

    let mut listed: BTreeSet<&ChunkId> = BTreeSet::new();
    for (index, citation) in plan.citations.iter().enumerate() {
        if !listed.insert(&citation.chunk_id) {
            return Err(SchemaError::DuplicateCitation {
                index,
                chunk_id: citation.chunk_id.clone(),
            });
        }
    }

    // Every inline evidence id must appear in the bibliography.
    for (path, evidence) in plan.claims() {
        for chunk_id in evidence {
            if !listed.contains(chunk_id) {
                return Err(SchemaError::UnlistedEvidence {
                    path,
                    chunk_id: chunk_id.clone(),
                });
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
