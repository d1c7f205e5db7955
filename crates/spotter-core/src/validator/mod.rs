//! Deterministic safety validation of generated plans.
//!
//! [`validate`] is a pure function of (plan, profile, bounds): no clock, no
//! randomness, no IO. Checks run in a fixed order and iterate ordered maps,
//! so the same inputs always produce the same report, byte for byte once
//! serialized. Hard violations block auto-acceptance and drive repair; soft
//! violations ride along as advisory notes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bounds::{BandPerKg, BoundsConfig, ContraRule};
use crate::plan::{Plan, TrainingBlock};
use crate::profile::{Goal, Profile};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks auto-acceptance; triggers corrective regeneration.
    Hard,
    /// Advisory only.
    Soft,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        };
        f.write_str(s)
    }
}

/// One bound violation, tagged with the offending field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Path into the plan document, e.g. `lift_plan[0].blocks[2].intensity`.
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ViolationKind {
    VolumeOutOfRange {
        goal: Goal,
        muscle_group: String,
        week: u32,
        min: u32,
        max: u32,
        observed: u32,
    },
    IntensityCapViolation {
        limit: f64,
        observed: f64,
    },
    RestSpacingViolation {
        muscle_group: String,
        required_days: u32,
        observed_days: u32,
    },
    ProgressionMonotonicityViolation {
        week: u32,
        lift: String,
    },
    NutritionGuardrailViolation {
        field: String,
        min: f64,
        max: f64,
        observed: f64,
    },
    KcalMismatch {
        stated: f64,
        computed: f64,
        tolerance_pct: f64,
    },
    ContraindicationViolation {
        condition: String,
        exercise: String,
    },
}

impl ViolationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::VolumeOutOfRange { .. } => "VolumeOutOfRange",
            Self::IntensityCapViolation { .. } => "IntensityCapViolation",
            Self::RestSpacingViolation { .. } => "RestSpacingViolation",
            Self::ProgressionMonotonicityViolation { .. } => "ProgressionMonotonicityViolation",
            Self::NutritionGuardrailViolation { .. } => "NutritionGuardrailViolation",
            Self::KcalMismatch { .. } => "KcalMismatch",
            Self::ContraindicationViolation { .. } => "ContraindicationViolation",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::VolumeOutOfRange {
                goal,
                muscle_group,
                week,
                min,
                max,
                observed,
            } => format!(
                "week {week} {muscle_group} volume {observed} sets outside {min}..={max} for {goal}"
            ),
            Self::IntensityCapViolation { limit, observed } => {
                format!("intensity {observed}% of 1RM exceeds the {limit}% cap")
            }
            Self::RestSpacingViolation {
                muscle_group,
                required_days,
                observed_days,
            } => format!(
                "{muscle_group} trained hard again after {observed_days} rest days (needs {required_days})"
            ),
            Self::ProgressionMonotonicityViolation { week, lift } => {
                format!("{lift} regresses in week {week} without a deload")
            }
            Self::NutritionGuardrailViolation {
                field,
                min,
                max,
                observed,
            } => format!("{field} {observed} outside the {min}..={max} band"),
            Self::KcalMismatch {
                stated,
                computed,
                tolerance_pct,
            } => format!(
                "stated {stated} kcal disagrees with macro arithmetic {computed} kcal by more than {tolerance_pct}%"
            ),
            Self::ContraindicationViolation {
                condition,
                exercise,
            } => format!("{exercise:?} is disallowed for {condition} and has no safe substitution"),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} at {}: {}",
            self.severity,
            self.kind.name(),
            self.field,
            self.kind.detail()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_hard(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Hard)
    }

    pub fn hard(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Hard)
    }

    pub fn soft(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Soft)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Check `plan` against every configured bound.
pub fn validate(plan: &Plan, profile: &Profile, bounds: &BoundsConfig) -> ValidationReport {
    let mut violations = Vec::new();
    check_volume(plan, profile, bounds, &mut violations);
    check_intensity(plan, profile, bounds, &mut violations);
    check_rest_spacing(plan, bounds, &mut violations);
    check_progression(plan, &mut violations);
    check_nutrition(plan, profile, bounds, &mut violations);
    check_contraindications(plan, profile, bounds, &mut violations);
    ValidationReport { violations }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

fn check_volume(
    plan: &Plan,
    profile: &Profile,
    bounds: &BoundsConfig,
    violations: &mut Vec<Violation>,
) {
    // Weekly sets per muscle group.
    let mut weekly: BTreeMap<(u32, String), u32> = BTreeMap::new();
    for day in &plan.lift_plan {
        for block in &day.blocks {
            *weekly
                .entry((day.week, normalize(&block.muscle_group)))
                .or_insert(0) += block.sets;
        }
    }

    for goal in &profile.goals {
        let Some(groups) = bounds.volume.get(goal) else {
            continue;
        };
        for ((week, group), &observed) in &weekly {
            let Some(range) = groups.get(group) else {
                continue;
            };
            if observed < range.min || observed > range.max {
                violations.push(Violation {
                    kind: ViolationKind::VolumeOutOfRange {
                        goal: *goal,
                        muscle_group: group.clone(),
                        week: *week,
                        min: range.min,
                        max: range.max,
                        observed,
                    },
                    severity: Severity::Soft,
                    field: "lift_plan".to_owned(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Intensity
// ---------------------------------------------------------------------------

fn check_intensity(
    plan: &Plan,
    profile: &Profile,
    bounds: &BoundsConfig,
    violations: &mut Vec<Violation>,
) {
    let Some(&limit) = bounds.intensity.max_pct_1rm.get(&profile.trained_status) else {
        return;
    };
    for (di, day) in plan.lift_plan.iter().enumerate() {
        for (bi, block) in day.blocks.iter().enumerate() {
            if let Some(observed) = block.intensity {
                if observed > limit {
                    violations.push(Violation {
                        kind: ViolationKind::IntensityCapViolation { limit, observed },
                        severity: Severity::Hard,
                        field: format!("lift_plan[{di}].blocks[{bi}].intensity"),
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rest spacing
// ---------------------------------------------------------------------------

fn check_rest_spacing(plan: &Plan, bounds: &BoundsConfig, violations: &mut Vec<Violation>) {
    let threshold = bounds.frequency.high_intensity_pct;

    // High-intensity session ordinals per group. Ordinal = day counted from
    // the start of the plan; one entry per calendar day per group.
    let mut sessions: BTreeMap<String, BTreeMap<u32, usize>> = BTreeMap::new();
    for (di, day) in plan.lift_plan.iter().enumerate() {
        let ordinal = day.week.saturating_sub(1) * 7 + day.day;
        for block in &day.blocks {
            if block.intensity.is_some_and(|pct| pct >= threshold) {
                sessions
                    .entry(normalize(&block.muscle_group))
                    .or_default()
                    .entry(ordinal)
                    .or_insert(di);
            }
        }
    }

    for (group, days) in &sessions {
        let required_days = bounds
            .frequency
            .min_rest_days
            .get(group)
            .copied()
            .unwrap_or(bounds.frequency.default_min_rest_days);
        let ordered: Vec<(&u32, &usize)> = days.iter().collect();
        for pair in ordered.windows(2) {
            let (&prev, _) = pair[0];
            let (&next, &di) = pair[1];
            let observed_days = (next - prev).saturating_sub(1);
            if observed_days < required_days {
                violations.push(Violation {
                    kind: ViolationKind::RestSpacingViolation {
                        muscle_group: group.clone(),
                        required_days,
                        observed_days,
                    },
                    severity: Severity::Hard,
                    field: format!("lift_plan[{di}]"),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Progression
// ---------------------------------------------------------------------------

struct WeekLoad {
    max_intensity: Option<f64>,
    sets: u32,
}

fn check_progression(plan: &Plan, violations: &mut Vec<Violation>) {
    let deload_weeks = plan.deload_weeks();

    // Weekly load per lift: max prescribed intensity, with set count as the
    // fallback metric when a lift carries no intensity figures.
    let mut lifts: BTreeMap<String, (String, BTreeMap<u32, WeekLoad>)> = BTreeMap::new();
    for day in &plan.lift_plan {
        for block in &day.blocks {
            let (_, weeks) = lifts
                .entry(normalize(&block.exercise))
                .or_insert_with(|| (block.exercise.clone(), BTreeMap::new()));
            let load = weeks.entry(day.week).or_insert(WeekLoad {
                max_intensity: None,
                sets: 0,
            });
            load.sets += block.sets;
            if let Some(pct) = block.intensity {
                load.max_intensity = Some(load.max_intensity.map_or(pct, |m| m.max(pct)));
            }
        }
    }

    for (display, weeks) in lifts.values() {
        let ordered: Vec<(&u32, &WeekLoad)> = weeks.iter().collect();
        for pair in ordered.windows(2) {
            let (&week_a, load_a) = pair[0];
            let (&week_b, load_b) = pair[1];
            if week_b != week_a + 1 {
                continue;
            }
            if deload_weeks.contains(&week_a) || deload_weeks.contains(&week_b) {
                continue;
            }
            let regressed = match (load_a.max_intensity, load_b.max_intensity) {
                (Some(a), Some(b)) => b < a,
                _ => load_b.sets < load_a.sets,
            };
            if regressed {
                violations.push(Violation {
                    kind: ViolationKind::ProgressionMonotonicityViolation {
                        week: week_b,
                        lift: display.clone(),
                    },
                    severity: Severity::Soft,
                    field: "lift_plan".to_owned(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Nutrition
// ---------------------------------------------------------------------------

fn check_nutrition(
    plan: &Plan,
    profile: &Profile,
    bounds: &BoundsConfig,
    violations: &mut Vec<Violation>,
) {
    let n = &plan.nutrition;
    let kg = profile.bodymass_kg;

    if kg > 0.0 {
        // Contraindications may tighten the protein ceiling.
        let mut protein_band = bounds.nutrition.protein_g_per_kg;
        for condition in &profile.contraindications {
            let Some(rule) = bounds.contraindications.get(&normalize(condition)) else {
                continue;
            };
            if let Some(cap) = rule.max_protein_g_per_kg {
                protein_band = Some(match protein_band {
                    Some(band) => BandPerKg {
                        min: band.min.min(cap),
                        max: band.max.min(cap),
                    },
                    None => BandPerKg { min: 0.0, max: cap },
                });
            }
        }
        check_band(violations, "protein_g", n.protein_g, protein_band, kg);
        check_band(violations, "fat_g", n.fat_g, bounds.nutrition.fat_g_per_kg, kg);
        check_band(violations, "carb_g", n.carb_g, bounds.nutrition.carb_g_per_kg, kg);
    }

    if let Some(tolerance_pct) = bounds.nutrition.kcal_tolerance_pct {
        let computed = 4.0 * (n.protein_g + n.carb_g) + 9.0 * n.fat_g;
        if computed > 0.0 {
            let gap_pct = ((n.kcal - computed) / computed).abs() * 100.0;
            if gap_pct > tolerance_pct {
                violations.push(Violation {
                    kind: ViolationKind::KcalMismatch {
                        stated: n.kcal,
                        computed,
                        tolerance_pct,
                    },
                    severity: Severity::Soft,
                    field: "nutrition.kcal".to_owned(),
                });
            }
        }
    }
}

fn check_band(
    violations: &mut Vec<Violation>,
    field: &str,
    observed: f64,
    band: Option<BandPerKg>,
    kg: f64,
) {
    let Some(band) = band else {
        return;
    };
    let (min, max) = (band.min * kg, band.max * kg);
    if observed < min || observed > max {
        violations.push(Violation {
            kind: ViolationKind::NutritionGuardrailViolation {
                field: field.to_owned(),
                min,
                max,
                observed,
            },
            severity: Severity::Hard,
            field: format!("nutrition.{field}"),
        });
    }
}

// ---------------------------------------------------------------------------
// Contraindications
// ---------------------------------------------------------------------------

fn check_contraindications(
    plan: &Plan,
    profile: &Profile,
    bounds: &BoundsConfig,
    violations: &mut Vec<Violation>,
) {
    for condition in &profile.contraindications {
        let Some(rule) = bounds.contraindications.get(&normalize(condition)) else {
            continue;
        };
        for (di, day) in plan.lift_plan.iter().enumerate() {
            for (bi, block) in day.blocks.iter().enumerate() {
                let exercise = normalize(&block.exercise);
                let disallowed = rule
                    .disallowed
                    .iter()
                    .any(|term| exercise.contains(&normalize(term)));
                if !disallowed || substitution_ok(block, rule) {
                    continue;
                }
                violations.push(Violation {
                    kind: ViolationKind::ContraindicationViolation {
                        condition: condition.clone(),
                        exercise: block.exercise.clone(),
                    },
                    severity: Severity::Hard,
                    field: format!("lift_plan[{di}].blocks[{bi}].exercise"),
                });
            }
        }
    }
}

/// A disallowed movement escapes violation only through a documented safe
/// substitution: not itself disallowed, and on the approved list when the
/// rule names one.
fn substitution_ok(block: &TrainingBlock, rule: &ContraRule) -> bool {
    let Some(sub) = &block.substitution else {
        return false;
    };
    let sub = normalize(sub);
    if sub.is_empty() {
        return false;
    }
    if rule.disallowed.iter().any(|term| sub.contains(&normalize(term))) {
        return false;
    }
    if rule.substitutes.is_empty() {
        return true;
    }
    rule.substitutes.iter().any(|approved| {
        let approved = normalize(approved);
        sub.contains(&approved) || approved.contains(&sub)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
