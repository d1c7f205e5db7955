//! Prompt construction for plan generation attempts.
//!
//! The prompt is a pure function of (request, context, feedback): same
//! inputs, same bytes. That keeps generation attempts replayable and makes
//! prompt regressions diffable in tests.

use spotter_evidence::RetrievalSet;

use crate::profile::PlanRequest;

/// Canonical shape of the plan document the model must emit.
pub const SCHEMA_REFERENCE: &str = r#"{
  "summary_text": "one-paragraph overview of the plan",
  "assumptions": ["anything you had to assume about the trainee"],
  "lift_plan": [
    {
      "week": 1,
      "day": 1,
      "deload": false,
      "blocks": [
        {
          "exercise": "Back Squat",
          "muscle_group": "quads",
          "sets": 3,
          "reps": "5",
          "intensity": 75.0,
          "rest": "3 min",
          "notes": null,
          "substitution": null,
          "evidence": ["<chunk_id>"]
        }
      ]
    }
  ],
  "nutrition": {
    "kcal": 2500.0,
    "protein_g": 150.0,
    "carb_g": 300.0,
    "fat_g": 70.0,
    "evidence": ["<chunk_id>"]
  },
  "progression_rules": "how loads advance week to week",
  "contraindications": ["conditions this plan works around"],
  "citations": [
    {"title": "source title", "doi": null, "chunk_id": "<chunk_id>"}
  ],
  "export": {"excel_ready": false, "csv_ready": false}
}"#;

/// Citation discipline the model must follow.
pub const CITATION_RULES: &str = "\
- Cite evidence only by the chunk ids listed in the EVIDENCE section.
- Every evidence id used inline must also appear once in citations.
- Never invent chunk ids, titles, or DOIs.
- A prescription you cannot support from the supplied evidence must say so \
in its notes instead of citing something else.";

/// Render the full generation prompt for one attempt.
///
/// `feedback` carries repair notes from the previous attempt; the feedback
/// section is omitted entirely on the first attempt.
pub fn build_prompt(request: &PlanRequest, context: &RetrievalSet, feedback: &[String]) -> String {
    let profile = &request.profile;
    let mut prompt = String::with_capacity(4096 + context.hits.len() * 512);

    prompt.push_str(
        "You are a strength and nutrition coach. Produce one training and \
nutrition plan as a single JSON object, with no prose outside it.\n\n",
    );

    prompt.push_str("## Output Schema\n\n");
    prompt.push_str(SCHEMA_REFERENCE);
    prompt.push_str("\n\n## Citation Rules\n\n");
    prompt.push_str(CITATION_RULES);

    prompt.push_str("\n\n## Trainee\n\n");
    prompt.push_str(&format!(
        "- bodymass: {} kg\n- trained status: {}\n- sex: {}\n",
        profile.bodymass_kg, profile.trained_status, profile.sex
    ));
    if let Some(age) = &profile.age_range {
        prompt.push_str(&format!("- age range: {}-{} years\n", age.min, age.max));
    }
    let goals = profile
        .goals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    prompt.push_str(&format!("- goals (priority order): {goals}\n"));
    if !profile.contraindications.is_empty() {
        prompt.push_str(&format!(
            "- contraindications: {}\n",
            profile.contraindications.join(", ")
        ));
    }
    if !profile.equipment.is_empty() {
        prompt.push_str(&format!("- equipment: {}\n", profile.equipment.join(", ")));
    }
    prompt.push_str(&format!(
        "- schedule: {} days per week for {} weeks\n",
        request.frequency_days_per_week, request.weeks
    ));
    for constraint in &request.constraints {
        prompt.push_str(&format!("- constraint: {constraint}\n"));
    }

    prompt.push_str("\n## Evidence\n\n");
    for hit in &context.hits {
        prompt.push('[');
        prompt.push_str(hit.chunk.id.as_str());
        prompt.push_str("]\n");
        prompt.push_str(&hit.chunk.text);
        prompt.push_str("\n\n");
    }

    if !feedback.is_empty() {
        prompt.push_str("## Previous Attempt Feedback\n\n");
        prompt.push_str("Your previous answer was rejected. Fix every item below:\n");
        for line in feedback {
            prompt.push_str("- ");
            prompt.push_str(line);
            prompt.push('\n');
        }
    }

    prompt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
