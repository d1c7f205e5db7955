//! `spotter plan`: serve one plan request end to end and print the response.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use spotter_core::assemble::PlanResponse;
use spotter_core::bounds::BoundsConfig;
use spotter_core::model::CommandModel;
use spotter_core::profile::PlanRequest;
use spotter_core::service::PlanService;

use crate::config::{self, SpotterConfig};
use crate::corpus;

pub async fn run_plan(
    resolved: &SpotterConfig,
    request_path: &str,
    bounds_path: Option<&str>,
    out_path: Option<&str>,
) -> Result<()> {
    // 1. Read and parse the request.
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("failed to read request file: {request_path}"))?;
    let request: PlanRequest = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse request file: {request_path}"))?;

    // 2. Load the bounds.
    let bounds_file = match bounds_path {
        Some(p) => PathBuf::from(p),
        None => config::bounds_path(),
    };
    let bounds = BoundsConfig::load(&bounds_file)
        .with_context(|| format!("failed to load bounds from {}", bounds_file.display()))?;

    // 3. Host the configured corpora.
    println!("Loading corpora...");
    let provider = corpus::build_provider(
        resolved.science_path.as_deref(),
        resolved.plans_path.as_deref(),
    )?;

    // 4. Build the model and the service.
    let model = CommandModel::new(
        resolved.model_program.clone(),
        resolved.model_args.clone(),
        resolved.model_timeout,
    );
    let service = PlanService::new(
        Arc::new(provider),
        None,
        Arc::new(model),
        resolved.service.clone(),
    );

    // 5. Generate.
    println!(
        "Generating plan {} with `{}`...",
        request.id, resolved.model_program
    );
    let response = service.generate(&request, &bounds).await;
    print_summary(&response);

    // 6. Emit the full response as JSON.
    let json = serde_json::to_string_pretty(&response).context("failed to serialize response")?;
    match out_path {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write response to {path}"))?;
            println!("Response written to {path}");
        }
        None => println!("{json}"),
    }

    if !response.is_success() {
        anyhow::bail!("plan generation failed");
    }
    Ok(())
}

fn print_summary(response: &PlanResponse) {
    match response {
        PlanResponse::Success(success) => {
            println!("Plan generated.");
            println!("  Attempts:   {}", success.attempts);
            println!(
                "  Grounding:  {}/{} claims",
                success.grounding.grounded_claims, success.grounding.total_claims
            );
            let weeks = success.plan.lift_plan.iter().map(|d| d.week).max().unwrap_or(0);
            println!("  Weeks:      {weeks}");
            println!("  Blocks:     {}", success.plan.block_count());
            if !success.degraded_indices.is_empty() {
                let names: Vec<String> = success
                    .degraded_indices
                    .iter()
                    .map(|i| i.to_string())
                    .collect();
                println!("  Degraded:   {} (index unavailable)", names.join(", "));
            }
            let soft: Vec<String> = success.validation.soft().map(|v| v.to_string()).collect();
            if soft.is_empty() {
                println!("  Violations: none");
            } else {
                println!("  Advisories:");
                for v in &soft {
                    println!("    - {v}");
                }
            }
            if success.plan.export.excel_ready {
                println!("  Export:     ready");
            }
        }
        PlanResponse::Failure(failure) => {
            println!("Plan generation failed: {}", failure.kind);
            println!("  {}", failure.message);
            for v in &failure.violations {
                println!("  - {v}");
            }
            if let Some(report) = &failure.grounding {
                for line in report.feedback_lines() {
                    println!("  - {line}");
                }
            }
        }
    }
}
