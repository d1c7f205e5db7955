//! Offline gate commands: `spotter validate`, `spotter ground`, `spotter bounds`.
//!
//! These run the deterministic checks against files on disk, with no model
//! and no service. Useful for vetting hand-edited plans and reviewer bounds
//! before they reach a deployment.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use spotter_core::bounds::BoundsConfig;
use spotter_core::grounding;
use spotter_core::plan::{Plan, parse_plan_json};
use spotter_core::profile::Profile;
use spotter_core::validator;
use spotter_evidence::ChunkId;

use crate::config;
use crate::corpus;

fn read_plan(path: &str) -> Result<Plan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan file: {path}"))?;
    parse_plan_json(&raw).map_err(|err| anyhow::anyhow!("plan failed the schema check: {err}"))
}

fn bounds_file(cli: Option<&str>) -> PathBuf {
    match cli {
        Some(p) => PathBuf::from(p),
        None => config::bounds_path(),
    }
}

// -----------------------------------------------------------------------
// spotter validate <plan> <profile>
// -----------------------------------------------------------------------

pub fn run_validate(plan_path: &str, profile_path: &str, bounds_path: Option<&str>) -> Result<()> {
    // 1. The plan goes through the same schema check the service applies.
    let plan = read_plan(plan_path)?;

    // 2. Profile and bounds.
    let raw = std::fs::read_to_string(profile_path)
        .with_context(|| format!("failed to read profile file: {profile_path}"))?;
    let profile: Profile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse profile file: {profile_path}"))?;

    let bounds_file = bounds_file(bounds_path);
    let bounds = BoundsConfig::load(&bounds_file)
        .with_context(|| format!("failed to load bounds from {}", bounds_file.display()))?;

    // 3. Validate and report.
    let report = validator::validate(&plan, &profile, &bounds);
    if report.is_clean() {
        println!("Plan is clean: no violations.");
        return Ok(());
    }

    println!("{} violation(s):", report.violations.len());
    for v in &report.violations {
        println!("  - {v}");
    }
    if report.has_hard() {
        bail!("plan has hard violations");
    }
    println!("Soft violations only; the plan is exportable.");
    Ok(())
}

// -----------------------------------------------------------------------
// spotter ground <plan> <chunks>...
// -----------------------------------------------------------------------

pub fn run_ground(plan_path: &str, chunk_paths: &[String]) -> Result<()> {
    let plan = read_plan(plan_path)?;

    // Citations must resolve against the union of the given corpora.
    let mut ids: BTreeSet<ChunkId> = BTreeSet::new();
    for path in chunk_paths {
        for chunk in corpus::load_chunks(Path::new(path))? {
            ids.insert(chunk.id);
        }
    }

    let report = grounding::verify(&plan, &ids);
    println!(
        "Claims grounded: {}/{} ({:.0}%)",
        report.grounded_claims,
        report.total_claims,
        report.ratio() * 100.0
    );
    for line in report.feedback_lines() {
        println!("  - {line}");
    }

    if !report.is_fully_grounded() {
        bail!("plan is not fully grounded");
    }
    println!("Fully grounded.");
    Ok(())
}

// -----------------------------------------------------------------------
// spotter bounds [file]
// -----------------------------------------------------------------------

pub fn run_bounds(path: Option<&str>) -> Result<()> {
    let file = bounds_file(path);
    let bounds = BoundsConfig::load(&file)
        .with_context(|| format!("failed to load bounds from {}", file.display()))?;

    println!("Bounds file {} is valid.", file.display());
    println!("  Volume goals:       {}", bounds.volume.len());
    println!("  Intensity caps:     {}", bounds.intensity.max_pct_1rm.len());
    println!(
        "  High-intensity at:  {:.1}% 1RM",
        bounds.frequency.high_intensity_pct
    );
    println!("  Contraindications:  {}", bounds.contraindications.len());
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use spotter_test_utils::{
        fixture_ids, grounded_plan, grounded_plan_json, plan_template_chunks, sample_profile,
        science_chunks,
    };

    const BOUNDS: &str = r#"
        [volume.strength]
        quads = { min = 3, max = 12 }
        chest = { min = 3, max = 14 }
        back = { min = 3, max = 14 }

        [intensity.max_pct_1rm]
        novice = 85.0

        [nutrition]
        protein_g_per_kg = { min = 1.6, max = 2.2 }
        kcal_tolerance_pct = 10.0
    "#;

    struct Files {
        tmp: tempfile::TempDir,
    }

    impl Files {
        fn new() -> Self {
            Self {
                tmp: tempfile::TempDir::new().unwrap(),
            }
        }

        fn write(&self, name: &str, contents: &str) -> String {
            let path = self.tmp.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path.to_string_lossy().into_owned()
        }
    }

    #[test]
    fn validate_accepts_a_clean_plan() {
        let files = Files::new();
        let plan = files.write("plan.json", &grounded_plan_json(&fixture_ids()));
        let profile = files.write(
            "profile.json",
            &serde_json::to_string(&sample_profile()).unwrap(),
        );
        let bounds = files.write("bounds.toml", BOUNDS);

        run_validate(&plan, &profile, Some(&bounds)).unwrap();
    }

    #[test]
    fn validate_rejects_a_hard_violation() {
        let files = Files::new();
        let mut plan = grounded_plan(&fixture_ids());
        plan.lift_plan[0].blocks[0].intensity = Some(95.0);
        let plan = files.write("plan.json", &serde_json::to_string(&plan).unwrap());
        let profile = files.write(
            "profile.json",
            &serde_json::to_string(&sample_profile()).unwrap(),
        );
        let bounds = files.write("bounds.toml", BOUNDS);

        let err = run_validate(&plan, &profile, Some(&bounds)).unwrap_err();
        assert!(err.to_string().contains("hard violations"));
    }

    #[test]
    fn validate_rejects_malformed_plan_json() {
        let files = Files::new();
        let plan = files.write("plan.json", "no plan here");
        let profile = files.write(
            "profile.json",
            &serde_json::to_string(&sample_profile()).unwrap(),
        );
        let bounds = files.write("bounds.toml", BOUNDS);

        let err = run_validate(&plan, &profile, Some(&bounds)).unwrap_err();
        assert!(err.to_string().contains("schema check"));
    }

    #[test]
    fn ground_passes_against_the_full_corpus() {
        let files = Files::new();
        let plan = files.write("plan.json", &grounded_plan_json(&fixture_ids()));
        let science = files.write(
            "science.json",
            &serde_json::to_string(&science_chunks()).unwrap(),
        );
        let plans = files.write(
            "plans.json",
            &serde_json::to_string(&plan_template_chunks()).unwrap(),
        );

        run_ground(&plan, &[science, plans]).unwrap();
    }

    #[test]
    fn ground_fails_when_a_cited_corpus_is_missing() {
        let files = Files::new();
        // Plan cites both corpora but only science is supplied.
        let plan = files.write("plan.json", &grounded_plan_json(&fixture_ids()));
        let science = files.write(
            "science.json",
            &serde_json::to_string(&science_chunks()).unwrap(),
        );

        let err = run_ground(&plan, &[science]).unwrap_err();
        assert!(err.to_string().contains("not fully grounded"));
    }

    #[test]
    fn bounds_reports_a_valid_file() {
        let files = Files::new();
        let bounds = files.write("bounds.toml", BOUNDS);
        run_bounds(Some(&bounds)).unwrap();
    }

    #[test]
    fn bounds_rejects_an_inverted_range() {
        let files = Files::new();
        let bounds = files.write(
            "bounds.toml",
            r#"
            [volume.strength]
            quads = { min = 12, max = 3 }
            "#,
        );
        let err = run_bounds(Some(&bounds)).unwrap_err();
        assert!(err.to_string().contains("failed to load bounds"));
    }
}
