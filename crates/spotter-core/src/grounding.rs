//! Citation grounding verification.
//!
//! Grounding is exact id membership: a claim is grounded when every chunk id
//! in its evidence list belongs to the context actually supplied to the
//! generation attempt. No text matching, no entailment scoring. [`verify`]
//! only reports; the one sanctioned plan mutation is [`apply_fallback`],
//! which the orchestrator invokes on the soft path to strip unverifiable
//! citations and mark the affected claims.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use spotter_evidence::ChunkId;

/// Marker appended to claims that lose their evidence in the fallback pass.
pub const INSUFFICIENT_EVIDENCE_NOTE: &str = "insufficient evidence in supplied sources";

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UngroundedReason {
    /// The claim cites nothing.
    MissingEvidence,
    /// The claim cites ids absent from the supplied context.
    UnknownEvidence { ids: Vec<ChunkId> },
}

/// A claim whose evidence does not hold up against the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UngroundedClaim {
    /// Path into the plan document, e.g. `lift_plan[1].blocks[0]`.
    pub path: String,
    pub reason: UngroundedReason,
}

/// A bibliography entry pointing at a chunk the context never contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleCitation {
    pub path: String,
    pub chunk_id: ChunkId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingReport {
    pub total_claims: usize,
    pub grounded_claims: usize,
    pub ungrounded: Vec<UngroundedClaim>,
    pub stale_citations: Vec<StaleCitation>,
}

impl GroundingReport {
    /// Grounded share of claims. Vacuously 1.0 when nothing requires
    /// grounding.
    pub fn ratio(&self) -> f64 {
        if self.total_claims == 0 {
            1.0
        } else {
            self.grounded_claims as f64 / self.total_claims as f64
        }
    }

    /// True when every claim is grounded and the bibliography is clean.
    pub fn is_fully_grounded(&self) -> bool {
        self.ungrounded.is_empty() && self.stale_citations.is_empty()
    }

    /// True when no cited id falls outside the context. Claims may still be
    /// evidence-free (annotated by the fallback), but nothing is fabricated.
    pub fn has_unknown_ids(&self) -> bool {
        !self.stale_citations.is_empty()
            || self
                .ungrounded
                .iter()
                .any(|c| matches!(c.reason, UngroundedReason::UnknownEvidence { .. }))
    }

    /// One-line summaries for repair prompts.
    pub fn feedback_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for claim in &self.ungrounded {
            match &claim.reason {
                UngroundedReason::MissingEvidence => {
                    lines.push(format!("{}: cites no evidence", claim.path));
                }
                UngroundedReason::UnknownEvidence { ids } => {
                    let ids = ids
                        .iter()
                        .map(ChunkId::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(format!("{}: cites unknown chunk ids [{ids}]", claim.path));
                }
            }
        }
        for stale in &self.stale_citations {
            lines.push(format!(
                "{}: bibliography entry {} is not in the supplied context",
                stale.path, stale.chunk_id
            ));
        }
        lines
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Check every claim and bibliography entry against `context_ids`.
pub fn verify(plan: &Plan, context_ids: &BTreeSet<ChunkId>) -> GroundingReport {
    let claims = plan.claims();
    let total_claims = claims.len();
    let mut grounded_claims = 0;
    let mut ungrounded = Vec::new();

    for (path, evidence) in claims {
        if evidence.is_empty() {
            ungrounded.push(UngroundedClaim {
                path,
                reason: UngroundedReason::MissingEvidence,
            });
            continue;
        }
        let unknown: Vec<ChunkId> = evidence
            .iter()
            .filter(|id| !context_ids.contains(*id))
            .cloned()
            .collect();
        if unknown.is_empty() {
            grounded_claims += 1;
        } else {
            ungrounded.push(UngroundedClaim {
                path,
                reason: UngroundedReason::UnknownEvidence { ids: unknown },
            });
        }
    }

    let stale_citations = plan
        .citations
        .iter()
        .enumerate()
        .filter(|(_, c)| !context_ids.contains(&c.chunk_id))
        .map(|(i, c)| StaleCitation {
            path: format!("citations[{i}]"),
            chunk_id: c.chunk_id.clone(),
        })
        .collect();

    GroundingReport {
        total_claims,
        grounded_claims,
        ungrounded,
        stale_citations,
    }
}

// ---------------------------------------------------------------------------
// Soft fallback
// ---------------------------------------------------------------------------

/// Downgrade unverifiable claims in place instead of repairing.
///
/// Strips every evidence id not in `context_ids`, annotates claims left with
/// no evidence, and drops stale bibliography entries. Idempotent. Returns
/// the number of claims downgraded to evidence-free.
pub fn apply_fallback(plan: &mut Plan, context_ids: &BTreeSet<ChunkId>) -> usize {
    let mut downgraded = 0;

    for day in &mut plan.lift_plan {
        for block in &mut day.blocks {
            block.evidence.retain(|id| context_ids.contains(id));
            if block.evidence.is_empty() && annotate(&mut block.notes) {
                downgraded += 1;
            }
        }
    }

    plan.nutrition.evidence.retain(|id| context_ids.contains(id));
    if plan.nutrition.evidence.is_empty() {
        let note = format!("nutrition targets: {INSUFFICIENT_EVIDENCE_NOTE}");
        if !plan.assumptions.contains(&note) {
            plan.assumptions.push(note);
            downgraded += 1;
        }
    }

    plan.citations.retain(|c| context_ids.contains(&c.chunk_id));
    downgraded
}

/// Append the marker to a notes field. False when already marked.
fn annotate(notes: &mut Option<String>) -> bool {
    match notes {
        Some(text) if text.contains(INSUFFICIENT_EVIDENCE_NOTE) => false,
        Some(text) => {
            text.push_str("; ");
            text.push_str(INSUFFICIENT_EVIDENCE_NOTE);
            true
        }
        None => {
            *notes = Some(INSUFFICIENT_EVIDENCE_NOTE.to_owned());
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
