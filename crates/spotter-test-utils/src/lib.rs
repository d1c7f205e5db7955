//! Shared fixtures and stub backends for integration tests.
//!
//! The fixture corpus is built so that [`sample_request`]'s retrieval query
//! matches every chunk: all fixture texts mention training, which keeps
//! end-to-end tests deterministic without caring about lexical scoring
//! details.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use spotter_core::bounds::BoundsConfig;
use spotter_core::model::{Completion, CompletionRequest, GenerationModel, ModelError};
use spotter_core::plan::{Citation, ExportFlags, NutritionTargets, Plan, TrainingBlock, TrainingDay};
use spotter_core::profile::{Goal, PlanRequest, Profile, SexCategory, TrainedStatus};
use spotter_evidence::{Chunk, ChunkId, IndexName, LicenseTag, MemoryIndexProvider, SourceMeta};

// ---------------------------------------------------------------------------
// Fixture corpus
// ---------------------------------------------------------------------------

fn chunk(doc_id: &str, ordinal: usize, title: &str, text: &str) -> Chunk {
    Chunk {
        id: ChunkId::mint(doc_id, ordinal),
        text: text.to_owned(),
        source: SourceMeta {
            doc_id: doc_id.to_owned(),
            title: title.to_owned(),
            doi: None,
            year: Some(2021),
            license: LicenseTag::CcBy,
        },
    }
}

/// Four peer-reviewed-style evidence chunks.
pub fn science_chunks() -> Vec<Chunk> {
    vec![
        chunk(
            "pmc-4561",
            0,
            "Dose-response of weekly set volume",
            "Resistance training volume between 4 and 12 weekly sets per \
             muscle group produced reliable strength gains in novice lifters.",
        ),
        chunk(
            "pmc-4561",
            1,
            "Dose-response of weekly set volume",
            "Training above 85 percent of one-repetition maximum showed no \
             additional benefit for novices and raised injury reports.",
        ),
        chunk(
            "pmc-7022",
            0,
            "Protein intake meta-analysis",
            "Protein intakes of 1.6 to 2.2 grams per kilogram supported \
             muscle accretion during resistance training programs.",
        ),
        chunk(
            "pmc-8317",
            0,
            "Progressive overload review",
            "Progression in training load of roughly 2.5 percent per week \
             was sustainable for novice and intermediate trainees.",
        ),
    ]
}

/// Two coach-written template chunks.
pub fn plan_template_chunks() -> Vec<Chunk> {
    vec![
        chunk(
            "tpl-novice-lp",
            0,
            "Novice linear progression template",
            "A three day full-body training template: squat, press, and row \
             for three sets of five, adding load every session.",
        ),
        chunk(
            "tpl-deload",
            0,
            "Deload week template",
            "Every fourth training week reduces volume and intensity by a \
             third to consolidate recovery.",
        ),
    ]
}

/// Every fixture chunk id, science then templates.
pub fn fixture_ids() -> Vec<ChunkId> {
    science_chunks()
        .into_iter()
        .chain(plan_template_chunks())
        .map(|c| c.id)
        .collect()
}

/// Provider hosting both fixture indices at version 1.
pub fn fixture_provider() -> MemoryIndexProvider {
    MemoryIndexProvider::new()
        .with_index(IndexName::Science, science_chunks())
        .with_index(IndexName::Plans, plan_template_chunks())
}

// ---------------------------------------------------------------------------
// Requests and bounds
// ---------------------------------------------------------------------------

pub fn sample_profile() -> Profile {
    Profile {
        bodymass_kg: 80.0,
        trained_status: TrainedStatus::Novice,
        goals: vec![Goal::Strength],
        sex: SexCategory::Unspecified,
        age_range: None,
        contraindications: vec![],
        equipment: vec!["barbell".to_owned()],
        training_age_years: Some(0.5),
    }
}

pub fn sample_request() -> PlanRequest {
    PlanRequest::new(sample_profile(), 3, 4)
}

const SAMPLE_BOUNDS: &str = r#"
    [volume.strength]
    quads = { min = 3, max = 12 }
    chest = { min = 3, max = 14 }
    back = { min = 3, max = 14 }

    [intensity.max_pct_1rm]
    novice = 85.0
    intermediate = 92.5
    advanced = 100.0

    [frequency]
    high_intensity_pct = 85.0
    default_min_rest_days = 1

    [nutrition]
    protein_g_per_kg = { min = 1.6, max = 2.2 }
    fat_g_per_kg = { min = 0.6, max = 1.0 }
    carb_g_per_kg = { min = 3.0, max = 7.0 }
    kcal_tolerance_pct = 10.0

    [contraindications.shoulder_impingement]
    disallowed = ["overhead press", "upright row"]
    substitutes = ["landmine press"]
"#;

/// Bounds the fixture plan passes cleanly.
pub fn sample_bounds() -> BoundsConfig {
    match BoundsConfig::from_toml_str(SAMPLE_BOUNDS) {
        Ok(bounds) => bounds,
        Err(err) => panic!("fixture bounds must parse: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Fixture plans
// ---------------------------------------------------------------------------

fn block(
    exercise: &str,
    muscle_group: &str,
    intensity: f64,
    evidence: Vec<ChunkId>,
) -> TrainingBlock {
    TrainingBlock {
        exercise: exercise.to_owned(),
        muscle_group: muscle_group.to_owned(),
        sets: 3,
        reps: "5".to_owned(),
        intensity: Some(intensity),
        rest: Some("3 min".to_owned()),
        notes: None,
        substitution: None,
        evidence,
    }
}

/// A two-week plan for [`sample_profile`] citing `evidence` round-robin on
/// every block and the nutrition targets. Passes [`sample_bounds`] with no
/// violations, and is fully grounded when `evidence` comes from the fixture
/// corpus. An empty `evidence` slice produces a citation-free plan.
pub fn grounded_plan(evidence: &[ChunkId]) -> Plan {
    let pick = |i: usize| -> Vec<ChunkId> {
        if evidence.is_empty() {
            vec![]
        } else {
            vec![evidence[i % evidence.len()].clone()]
        }
    };

    let day = |week: u32, base: f64, offset: usize| TrainingDay {
        week,
        day: 1,
        deload: false,
        blocks: vec![
            block("Back Squat", "quads", base, pick(offset)),
            block("Bench Press", "chest", base - 2.5, pick(offset + 1)),
            block("Barbell Row", "back", base - 5.0, pick(offset + 2)),
        ],
    };

    let mut citations: Vec<Citation> = Vec::new();
    for id in evidence {
        if citations.iter().all(|c| &c.chunk_id != id) {
            citations.push(Citation {
                title: None,
                doi: None,
                chunk_id: id.clone(),
            });
        }
    }

    Plan {
        summary_text: "Two-week novice strength block, one full-body day per week.".to_owned(),
        assumptions: vec!["barbell and rack available".to_owned()],
        lift_plan: vec![day(1, 75.0, 0), day(2, 77.5, 3)],
        nutrition: NutritionTargets {
            kcal: 2470.0,
            protein_g: 160.0,
            carb_g: 300.0,
            fat_g: 70.0,
            evidence: pick(1),
        },
        progression_rules: "add 2.5% of 1RM to each lift weekly".to_owned(),
        contraindications: vec![],
        citations,
        export: ExportFlags::default(),
    }
}

/// [`grounded_plan`] rendered as the model would emit it.
pub fn grounded_plan_json(evidence: &[ChunkId]) -> String {
    match serde_json::to_string_pretty(&grounded_plan(evidence)) {
        Ok(json) => json,
        Err(err) => panic!("fixture plan must serialize: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Stub models
// ---------------------------------------------------------------------------

/// Replays a scripted sequence of completions, recording every prompt.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: StdMutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            prompts: StdMutex::new(Vec::new()),
        }
    }

    /// Convenience for a script of plain completions.
    pub fn replies(texts: Vec<String>) -> Self {
        Self::new(texts.into_iter().map(Ok).collect())
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl GenerationModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ModelError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        let next = self.script.lock().await.pop_front();
        match next {
            Some(Ok(text)) => Ok(Completion {
                text,
                model: "scripted".to_owned(),
            }),
            Some(Err(err)) => Err(err),
            None => Err(ModelError::Unavailable {
                detail: "script exhausted".to_owned(),
            }),
        }
    }
}

/// Fails with transient errors `failures` times, then returns `text` forever.
pub struct FlakyModel {
    remaining: Mutex<u32>,
    text: String,
}

impl FlakyModel {
    pub fn new(failures: u32, text: String) -> Self {
        Self {
            remaining: Mutex::new(failures),
            text,
        }
    }
}

#[async_trait]
impl GenerationModel for FlakyModel {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ModelError> {
        let mut remaining = self.remaining.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ModelError::Unavailable {
                detail: "transient outage".to_owned(),
            });
        }
        Ok(Completion {
            text: self.text.clone(),
            model: "flaky".to_owned(),
        })
    }
}

/// Sleeps for a fixed delay before answering; for deadline tests.
pub struct DelayedModel {
    delay: Duration,
    text: String,
}

impl DelayedModel {
    pub fn new(delay: Duration, text: String) -> Self {
        Self { delay, text }
    }
}

#[async_trait]
impl GenerationModel for DelayedModel {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ModelError> {
        tokio::time::sleep(self.delay).await;
        Ok(Completion {
            text: self.text.clone(),
            model: "delayed".to_owned(),
        })
    }
}
