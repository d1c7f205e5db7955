//! Optional second-pass reranking of merged retrieval results.
//!
//! A [`RelevanceScorer`] (typically a cross-encoder behind a service) scores
//! each (query, chunk) pair with bounded concurrency; the candidate set is
//! then stably reordered and truncated. Reranking never adds or fabricates
//! candidates, and equal scores keep the retriever's order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::debug;

use crate::retrieval::{RetrievalSet, RetrievedChunk};

/// Scores one (query, passage) pair; higher is more relevant.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, query: &str, passage: &str) -> Result<f32, ScorerError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn RelevanceScorer) {}
};

#[derive(Debug, Error)]
#[error("relevance scorer failed: {detail}")]
pub struct ScorerError {
    pub detail: String,
}

impl ScorerError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Final context size handed to generation.
    pub top_n: usize,
    /// Concurrent scorer calls per pass.
    pub concurrency: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: 6,
            concurrency: 4,
        }
    }
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    config: RerankConfig,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, config: RerankConfig) -> Self {
        Self { scorer, config }
    }

    pub fn top_n(&self) -> usize {
        self.config.top_n
    }

    /// Reorder `set` by scorer relevance and truncate to `top_n`.
    ///
    /// When disabled, the retriever's order passes through (truncated) so the
    /// pipeline behaves identically with the pass switched off.
    pub async fn rerank(
        &self,
        query: &str,
        mut set: RetrievalSet,
    ) -> Result<RetrievalSet, ScorerError> {
        if !self.config.enabled || set.hits.is_empty() {
            set.truncate(self.config.top_n);
            return Ok(set);
        }

        let scores: Vec<f32> = stream::iter(set.hits.iter().map(|hit| {
            let scorer = Arc::clone(&self.scorer);
            async move { scorer.score(query, &hit.chunk.text).await }
        }))
        .buffered(self.config.concurrency.max(1))
        .try_collect()
        .await?;

        // Stable sort over candidate positions: ties keep retrieval order.
        let mut order: Vec<usize> = (0..set.hits.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut slots: Vec<Option<RetrievedChunk>> = set.hits.into_iter().map(Some).collect();
        let mut reranked = Vec::with_capacity(self.config.top_n.min(slots.len()));
        for &i in order.iter().take(self.config.top_n) {
            if let Some(mut hit) = slots[i].take() {
                hit.score = scores[i];
                reranked.push(hit);
            }
        }

        debug!(
            candidates = slots.len(),
            kept = reranked.len(),
            "rerank pass complete"
        );
        set.hits = reranked;
        Ok(set)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
