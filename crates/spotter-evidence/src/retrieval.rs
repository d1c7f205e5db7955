//! Cross-index retrieval.
//!
//! One retrieval pass fans out to every requested index concurrently, each
//! search under its own timeout, then merges the results into a single
//! deterministic ranking: deduplicated by chunk id keeping the highest
//! score, ordered by score descending with chunk id ascending as the
//! tie-break. A failed index degrades the pass instead of failing it; only
//! the loss of every index is an error.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkId, IndexName, SnapshotVersion};
use crate::provider::{IndexProvider, IndexSnapshot, ProviderError, SearchHit};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tuning for one retrieval pass.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Hits requested from each index.
    pub k: usize,
    /// Budget for a single index search.
    pub per_index_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 8,
            per_index_timeout: Duration::from_millis(2_000),
        }
    }
}

/// One chunk in the merged ranking, tagged with the index it came from.
///
/// When the same chunk surfaced from several indices, `index` is the one
/// that produced the kept (highest) score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub index: IndexName,
}

/// The merged, ordered output of one retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct RetrievalSet {
    pub hits: Vec<RetrievedChunk>,
    /// Snapshot versions actually consulted, in the order queried.
    pub versions: Vec<(IndexName, SnapshotVersion)>,
    /// Indices that failed and were skipped.
    pub degraded: Vec<IndexName>,
}

impl RetrievalSet {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn truncate(&mut self, n: usize) {
        self.hits.truncate(n);
    }

    /// The id set generation is allowed to cite.
    pub fn context_ids(&self) -> BTreeSet<ChunkId> {
        self.hits.iter().map(|h| h.chunk.id.clone()).collect()
    }
}

/// Errors terminating a retrieval pass.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Every consulted index failed; there is no evidence to work with.
    #[error("all retrieval indices unavailable")]
    AllIndicesUnavailable {
        errors: Vec<(IndexName, ProviderError)>,
    },
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

pub struct Retriever {
    provider: Arc<dyn IndexProvider>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(provider: Arc<dyn IndexProvider>, config: RetrievalConfig) -> Self {
        Self { provider, config }
    }

    /// Query `indices` concurrently and merge into one deterministic ranking.
    pub async fn retrieve(
        &self,
        query: &str,
        indices: &[IndexName],
    ) -> Result<RetrievalSet, RetrievalError> {
        // 1. Fan out, one pinned-snapshot search per index.
        let searches = indices.iter().map(|&index| self.search_one(query, index));
        let outcomes = futures::future::join_all(searches).await;

        // 2. Partition successes from failures, merging as we go.
        let mut merged: HashMap<ChunkId, RetrievedChunk> = HashMap::new();
        let mut versions = Vec::new();
        let mut degraded = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((index, version, hits)) => {
                    versions.push((index, version));
                    for hit in hits {
                        merge_hit(&mut merged, hit, index);
                    }
                }
                Err(err) => {
                    let index = err.index();
                    warn!(index = %index, error = %err, "index search failed; continuing degraded");
                    degraded.push(index);
                    errors.push((index, err));
                }
            }
        }

        // 3. Losing every index is fatal; losing some is a recorded handicap.
        if versions.is_empty() && !indices.is_empty() {
            return Err(RetrievalError::AllIndicesUnavailable { errors });
        }

        // 4. Total order: score descending, chunk id ascending.
        let mut hits: Vec<RetrievedChunk> = merged.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        debug!(
            hits = hits.len(),
            degraded = degraded.len(),
            "retrieval pass merged"
        );
        Ok(RetrievalSet {
            hits,
            versions,
            degraded,
        })
    }

    async fn search_one(
        &self,
        query: &str,
        index: IndexName,
    ) -> Result<(IndexName, SnapshotVersion, Vec<SearchHit>), ProviderError> {
        let snapshot = self.provider.snapshot(index).await?;
        let version = snapshot.version();
        debug!(index = %index, version = %version, chunks = snapshot.len(), "pinned snapshot");
        let budget = self.config.per_index_timeout;
        match tokio::time::timeout(budget, snapshot.search(query, self.config.k)).await {
            Ok(result) => Ok((index, version, result?)),
            Err(_) => Err(ProviderError::Timeout {
                index,
                elapsed_ms: budget.as_millis() as u64,
            }),
        }
    }
}

/// Keep the highest-scoring instance of each chunk id. Exact score ties keep
/// the earlier index in query order, so merges are stable.
fn merge_hit(merged: &mut HashMap<ChunkId, RetrievedChunk>, hit: SearchHit, index: IndexName) {
    match merged.entry(hit.chunk.id.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(RetrievedChunk {
                chunk: hit.chunk,
                score: hit.score,
                index,
            });
        }
        Entry::Occupied(mut slot) => {
            if hit.score > slot.get().score {
                slot.insert(RetrievedChunk {
                    chunk: hit.chunk,
                    score: hit.score,
                    index,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{LicenseTag, SourceMeta};
    use crate::provider::IndexSnapshot;
    use async_trait::async_trait;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: ChunkId::new(id),
            text: text.to_owned(),
            source: SourceMeta {
                doc_id: id.to_owned(),
                title: id.to_owned(),
                doi: None,
                year: None,
                license: LicenseTag::CcBy,
            },
        }
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk: chunk(id, "text"),
            score,
        }
    }

    /// Provider serving canned hits per index, with optional failures.
    struct CannedProvider {
        science: Result<Vec<SearchHit>, String>,
        plans: Result<Vec<SearchHit>, String>,
    }

    #[derive(Debug)]
    struct CannedSnapshot {
        index: IndexName,
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl IndexSnapshot for CannedSnapshot {
        fn index(&self) -> IndexName {
            self.index
        }

        fn version(&self) -> SnapshotVersion {
            SnapshotVersion(7)
        }

        fn len(&self) -> usize {
            self.hits.len()
        }

        async fn search(&self, _query: &str, k: usize) -> Result<Vec<SearchHit>, ProviderError> {
            Ok(self.hits.iter().take(k).cloned().collect())
        }
    }

    #[async_trait]
    impl IndexProvider for CannedProvider {
        async fn snapshot(
            &self,
            index: IndexName,
        ) -> Result<Arc<dyn IndexSnapshot>, ProviderError> {
            let canned = match index {
                IndexName::Science => &self.science,
                IndexName::Plans => &self.plans,
            };
            match canned {
                Ok(hits) => Ok(Arc::new(CannedSnapshot {
                    index,
                    hits: hits.clone(),
                })),
                Err(detail) => Err(ProviderError::Unavailable {
                    index,
                    detail: detail.clone(),
                }),
            }
        }
    }

    fn retriever(provider: CannedProvider) -> Retriever {
        Retriever::new(Arc::new(provider), RetrievalConfig::default())
    }

    // -- merge tests ----------------------------------------------------------

    #[tokio::test]
    async fn merge_deduplicates_keeping_highest_score() {
        let r = retriever(CannedProvider {
            science: Ok(vec![hit("shared", 0.4), hit("sci", 0.9)]),
            plans: Ok(vec![hit("shared", 0.8), hit("tpl", 0.5)]),
        });
        let set = r.retrieve("q", &IndexName::ALL).await.unwrap();
        let ids: Vec<&str> = set.hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["sci", "shared", "tpl"]);

        let shared = &set.hits[1];
        assert!((shared.score - 0.8).abs() < f32::EPSILON);
        assert_eq!(shared.index, IndexName::Plans);
    }

    #[tokio::test]
    async fn equal_scores_tie_break_by_chunk_id() {
        let r = retriever(CannedProvider {
            science: Ok(vec![hit("zzz", 0.5), hit("aaa", 0.5)]),
            plans: Ok(vec![hit("mmm", 0.5)]),
        });
        let set = r.retrieve("q", &IndexName::ALL).await.unwrap();
        let ids: Vec<&str> = set.hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "mmm", "zzz"]);
    }

    #[tokio::test]
    async fn exact_score_tie_on_same_id_keeps_first_index() {
        let r = retriever(CannedProvider {
            science: Ok(vec![hit("dup", 0.5)]),
            plans: Ok(vec![hit("dup", 0.5)]),
        });
        let set = r.retrieve("q", &IndexName::ALL).await.unwrap();
        assert_eq!(set.hits.len(), 1);
        assert_eq!(set.hits[0].index, IndexName::Science);
    }

    #[tokio::test]
    async fn retrieval_is_deterministic_across_runs() {
        let make = || {
            retriever(CannedProvider {
                science: Ok(vec![hit("a", 0.5), hit("b", 0.5), hit("c", 0.9)]),
                plans: Ok(vec![hit("d", 0.5), hit("b", 0.7)]),
            })
        };
        let first = make().retrieve("q", &IndexName::ALL).await.unwrap();
        let second = make().retrieve("q", &IndexName::ALL).await.unwrap();
        let ids =
            |s: &RetrievalSet| s.hits.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    // -- degradation tests ------------------------------------------------------

    #[tokio::test]
    async fn one_failed_index_degrades_but_returns() {
        let r = retriever(CannedProvider {
            science: Ok(vec![hit("sci", 0.9)]),
            plans: Err("disk gone".to_owned()),
        });
        let set = r.retrieve("q", &IndexName::ALL).await.unwrap();
        assert_eq!(set.hits.len(), 1);
        assert_eq!(set.degraded, vec![IndexName::Plans]);
        assert_eq!(set.versions, vec![(IndexName::Science, SnapshotVersion(7))]);
    }

    #[tokio::test]
    async fn all_failed_indices_is_an_error() {
        let r = retriever(CannedProvider {
            science: Err("down".to_owned()),
            plans: Err("down".to_owned()),
        });
        let err = r.retrieve("q", &IndexName::ALL).await.unwrap_err();
        let RetrievalError::AllIndicesUnavailable { errors } = err;
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn empty_index_list_yields_empty_set() {
        let r = retriever(CannedProvider {
            science: Ok(vec![]),
            plans: Ok(vec![]),
        });
        let set = r.retrieve("q", &[]).await.unwrap();
        assert!(set.is_empty());
        assert!(set.degraded.is_empty());
    }

    #[tokio::test]
    async fn context_ids_cover_all_hits() {
        let r = retriever(CannedProvider {
            science: Ok(vec![hit("a", 0.9), hit("b", 0.3)]),
            plans: Ok(vec![hit("c", 0.6)]),
        });
        let set = r.retrieve("q", &IndexName::ALL).await.unwrap();
        let ids = set.context_ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&ChunkId::new("a")));
        assert!(ids.contains(&ChunkId::new("c")));
    }
}
