//! Request-level plan service.
//!
//! Wraps the retrieval, rerank, generation, and assembly stages behind one
//! call, adding the per-request deadline and the global concurrency cap.
//! The service never returns `Err`: every outcome, including its own
//! timeouts, becomes a [`PlanResponse`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assemble::{self, PlanResponse};
use crate::bounds::BoundsConfig;
use crate::error::PlanError;
use crate::model::GenerationModel;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::profile::PlanRequest;
use spotter_evidence::{
    IndexName, IndexProvider, RelevanceScorer, RerankConfig, Reranker, RetrievalConfig,
    Retriever,
};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub orchestrator: OrchestratorConfig,
    /// Requests allowed in flight at once; the rest queue.
    pub max_concurrent: usize,
    /// Wall-clock budget for one request, queueing excluded.
    pub deadline: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            max_concurrent: 4,
            deadline: Duration::from_secs(15),
        }
    }
}

pub struct PlanService {
    retriever: Retriever,
    reranker: Option<Reranker>,
    top_n: usize,
    orchestrator: Orchestrator,
    limiter: Arc<Semaphore>,
    deadline: Duration,
}

impl PlanService {
    /// Build a service. `scorer` is optional; without one the retriever's
    /// order is used directly.
    pub fn new(
        provider: Arc<dyn IndexProvider>,
        scorer: Option<Arc<dyn RelevanceScorer>>,
        model: Arc<dyn GenerationModel>,
        config: ServiceConfig,
    ) -> Self {
        let top_n = config.rerank.top_n;
        let reranker = scorer.map(|s| Reranker::new(s, config.rerank.clone()));
        Self {
            retriever: Retriever::new(provider, config.retrieval),
            reranker,
            top_n,
            orchestrator: Orchestrator::new(model, config.orchestrator),
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            deadline: config.deadline,
        }
    }

    /// Serve one plan request end to end.
    pub async fn generate(&self, request: &PlanRequest, bounds: &BoundsConfig) -> PlanResponse {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(request_id = %request.id, "service shutting down, refusing request");
                return assemble::assemble_failure(request.id, &PlanError::DeadlineExceeded);
            }
        };

        let cancel = CancellationToken::new();
        match tokio::time::timeout(self.deadline, self.run(request, bounds, &cancel)).await {
            Ok(response) => response,
            Err(_) => {
                cancel.cancel();
                warn!(
                    request_id = %request.id,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "request deadline exceeded"
                );
                assemble::assemble_failure(request.id, &PlanError::DeadlineExceeded)
            }
        }
    }

    async fn run(
        &self,
        request: &PlanRequest,
        bounds: &BoundsConfig,
        cancel: &CancellationToken,
    ) -> PlanResponse {
        // 1. Retrieve from both indices.
        let query = request.retrieval_query();
        let retrieved = match self.retriever.retrieve(&query, &IndexName::ALL).await {
            Ok(set) => set,
            Err(err) => {
                let err = PlanError::from(err);
                return assemble::assemble_failure(request.id, &err);
            }
        };
        let degraded = retrieved.degraded.clone();
        info!(
            request_id = %request.id,
            candidates = retrieved.len(),
            degraded = degraded.len(),
            "retrieval complete"
        );

        // 2. Optional rerank. A scorer outage is a degradation, not a
        // failure; retrieval order already carries the request.
        let context = match &self.reranker {
            Some(reranker) => match reranker.rerank(&query, retrieved.clone()).await {
                Ok(reranked) => reranked,
                Err(err) => {
                    warn!(request_id = %request.id, error = %err, "rerank failed, keeping retrieval order");
                    let mut fallback = retrieved;
                    fallback.truncate(self.top_n);
                    fallback
                }
            },
            None => {
                let mut set = retrieved;
                set.truncate(self.top_n);
                set
            }
        };

        // 3. Generate and assemble.
        match self
            .orchestrator
            .generate(request, bounds, &context, cancel)
            .await
        {
            Ok(outcome) => assemble::assemble_success(request.id, outcome, degraded),
            Err(err) => assemble::assemble_failure(request.id, &err),
        }
    }
}
