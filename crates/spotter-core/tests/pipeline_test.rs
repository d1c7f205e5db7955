//! End-to-end service tests: retrieval through assembled response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use spotter_core::assemble::PlanResponse;
use spotter_core::error::FailureKind;
use spotter_core::model::RetryPolicy;
use spotter_core::orchestrator::OrchestratorConfig;
use spotter_core::service::{PlanService, ServiceConfig};
use spotter_evidence::{
    ChunkId, IndexName, MemoryIndexProvider, RelevanceScorer, ScorerError,
};
use spotter_test_utils::{
    DelayedModel, ScriptedModel, fixture_ids, fixture_provider, grounded_plan_json,
    sample_bounds, sample_request, science_chunks,
};

fn fast_service_config() -> ServiceConfig {
    ServiceConfig {
        orchestrator: OrchestratorConfig {
            retry: RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            ..OrchestratorConfig::default()
        },
        ..ServiceConfig::default()
    }
}

fn service(provider: MemoryIndexProvider, model: ScriptedModel) -> PlanService {
    PlanService::new(
        Arc::new(provider),
        None,
        Arc::new(model),
        fast_service_config(),
    )
}

#[tokio::test]
async fn full_pipeline_produces_an_exportable_plan() {
    let svc = service(
        fixture_provider(),
        ScriptedModel::replies(vec![grounded_plan_json(&fixture_ids())]),
    );
    let request = sample_request();
    let response = svc.generate(&request, &sample_bounds()).await;

    let PlanResponse::Success(success) = response else {
        panic!("expected success, got {response:?}");
    };
    assert_eq!(success.request_id, request.id);
    assert_eq!(success.attempts, 1);
    assert!(success.degraded_indices.is_empty());
    assert!(success.grounding.is_fully_grounded());
    assert!(success.validation.is_clean());
    assert!(success.plan.export.excel_ready);
    assert!(success.plan.export.csv_ready);
}

#[tokio::test]
async fn repair_loop_runs_inside_the_service() {
    let svc = service(
        fixture_provider(),
        ScriptedModel::replies(vec![
            "not json".to_owned(),
            grounded_plan_json(&fixture_ids()),
        ]),
    );
    let response = svc.generate(&sample_request(), &sample_bounds()).await;

    let PlanResponse::Success(success) = response else {
        panic!("expected success, got {response:?}");
    };
    assert_eq!(success.attempts, 2);
}

#[tokio::test]
async fn no_hosted_indices_is_retrieval_unavailable() {
    let svc = service(
        MemoryIndexProvider::new(),
        ScriptedModel::replies(vec![grounded_plan_json(&fixture_ids())]),
    );
    let response = svc.generate(&sample_request(), &sample_bounds()).await;

    let PlanResponse::Failure(failure) = response else {
        panic!("expected failure, got {response:?}");
    };
    assert_eq!(failure.kind, FailureKind::RetrievalUnavailable);
}

#[tokio::test]
async fn one_lost_index_degrades_the_response() {
    let science_ids: Vec<ChunkId> = science_chunks().into_iter().map(|c| c.id).collect();
    let provider = MemoryIndexProvider::new().with_index(IndexName::Science, science_chunks());
    let svc = service(
        provider,
        ScriptedModel::replies(vec![grounded_plan_json(&science_ids)]),
    );
    let response = svc.generate(&sample_request(), &sample_bounds()).await;

    let PlanResponse::Success(success) = response else {
        panic!("expected success, got {response:?}");
    };
    assert_eq!(success.degraded_indices, vec![IndexName::Plans]);
    assert!(success.grounding.is_fully_grounded());
}

#[tokio::test]
async fn persistent_fabrication_surfaces_as_grounding_failure() {
    let ghost = vec![ChunkId::new("ghost:000000000000")];
    let svc = service(
        fixture_provider(),
        ScriptedModel::replies(vec![
            grounded_plan_json(&ghost),
            grounded_plan_json(&ghost),
            grounded_plan_json(&ghost),
        ]),
    );
    let response = svc.generate(&sample_request(), &sample_bounds()).await;

    let PlanResponse::Failure(failure) = response else {
        panic!("expected failure, got {response:?}");
    };
    assert_eq!(failure.kind, FailureKind::GroundingInsufficient);
    let report = failure.grounding.expect("grounding report attached");
    assert!(report.has_unknown_ids());
}

#[tokio::test]
async fn slow_model_hits_the_request_deadline() {
    let config = ServiceConfig {
        deadline: Duration::from_millis(50),
        ..fast_service_config()
    };
    let svc = PlanService::new(
        Arc::new(fixture_provider()),
        None,
        Arc::new(DelayedModel::new(
            Duration::from_secs(5),
            grounded_plan_json(&fixture_ids()),
        )),
        config,
    );
    let request = sample_request();
    let response = svc.generate(&request, &sample_bounds()).await;

    let PlanResponse::Failure(failure) = response else {
        panic!("expected failure, got {response:?}");
    };
    assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    assert_eq!(failure.request_id, request.id);
}

#[tokio::test]
async fn scorer_outage_degrades_to_retrieval_order() {
    struct BrokenScorer;

    #[async_trait]
    impl RelevanceScorer for BrokenScorer {
        async fn score(&self, _query: &str, _passage: &str) -> Result<f32, ScorerError> {
            Err(ScorerError::new("scorer service down"))
        }
    }

    let svc = PlanService::new(
        Arc::new(fixture_provider()),
        Some(Arc::new(BrokenScorer)),
        Arc::new(ScriptedModel::replies(vec![grounded_plan_json(
            &fixture_ids(),
        )])),
        fast_service_config(),
    );
    let response = svc.generate(&sample_request(), &sample_bounds()).await;

    // Reranking is a refinement; losing it never fails the request.
    assert!(response.is_success(), "got {response:?}");
}

#[tokio::test]
async fn working_scorer_still_yields_grounded_output() {
    struct LengthScorer;

    #[async_trait]
    impl RelevanceScorer for LengthScorer {
        async fn score(&self, _query: &str, passage: &str) -> Result<f32, ScorerError> {
            Ok(passage.len() as f32)
        }
    }

    let svc = PlanService::new(
        Arc::new(fixture_provider()),
        Some(Arc::new(LengthScorer)),
        Arc::new(ScriptedModel::replies(vec![grounded_plan_json(
            &fixture_ids(),
        )])),
        fast_service_config(),
    );
    let response = svc.generate(&sample_request(), &sample_bounds()).await;

    let PlanResponse::Success(success) = response else {
        panic!("expected success, got {response:?}");
    };
    assert!(success.grounding.is_fully_grounded());
}
