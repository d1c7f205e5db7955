//! In-memory index provider.
//!
//! Each hosted index holds an `Arc`-swapped immutable snapshot; readers pin
//! the current `Arc` and keep searching it even while a rebuild publishes a
//! new one. Scoring is lexical token overlap, which is cheap, deterministic,
//! and good enough for fixture-scale corpora; production deployments put a
//! real vector index behind the same [`IndexProvider`] trait.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::chunk::{Chunk, IndexName, SnapshotVersion};
use crate::provider::{IndexProvider, IndexSnapshot, ProviderError, SearchHit};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One immutable build of an in-memory index.
#[derive(Debug)]
pub struct MemorySnapshot {
    index: IndexName,
    version: SnapshotVersion,
    chunks: Vec<Chunk>,
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

impl MemorySnapshot {
    /// Share of query tokens present in `doc_tokens`.
    fn overlap(query_tokens: &BTreeSet<String>, doc_tokens: &BTreeSet<String>) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let matched = query_tokens.intersection(doc_tokens).count();
        matched as f32 / query_tokens.len() as f32
    }
}

#[async_trait]
impl IndexSnapshot for MemorySnapshot {
    fn index(&self) -> IndexName {
        self.index
    }

    fn version(&self) -> SnapshotVersion {
        self.version
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let query_tokens = tokenize(query);
        let mut hits: Vec<SearchHit> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = Self::overlap(&query_tokens, &tokenize(&chunk.text));
                (score > 0.0).then(|| SearchHit {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Hosts zero or more in-memory indices with atomically swappable snapshots.
pub struct MemoryIndexProvider {
    indices: HashMap<IndexName, RwLock<Arc<MemorySnapshot>>>,
}

impl std::fmt::Debug for MemoryIndexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndexProvider")
            .field("indices", &self.indices.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MemoryIndexProvider {
    /// A provider hosting no indices; every snapshot request is `NotHosted`.
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
        }
    }

    /// Host `index` with an initial chunk set at version 1.
    pub fn with_index(mut self, index: IndexName, chunks: Vec<Chunk>) -> Self {
        let snapshot = MemorySnapshot {
            index,
            version: SnapshotVersion(1),
            chunks,
        };
        self.indices.insert(index, RwLock::new(Arc::new(snapshot)));
        self
    }

    /// Publish a new snapshot of `index`, bumping its version.
    ///
    /// Requests that pinned the previous snapshot keep it until they finish.
    pub async fn rebuild(
        &self,
        index: IndexName,
        chunks: Vec<Chunk>,
    ) -> Result<SnapshotVersion, ProviderError> {
        let slot = self
            .indices
            .get(&index)
            .ok_or(ProviderError::NotHosted { index })?;
        let mut guard = slot.write().await;
        let version = guard.version.next();
        *guard = Arc::new(MemorySnapshot {
            index,
            version,
            chunks,
        });
        info!(index = %index, version = %version, chunks = guard.len(), "published index snapshot");
        Ok(version)
    }
}

impl Default for MemoryIndexProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexProvider for MemoryIndexProvider {
    async fn snapshot(&self, index: IndexName) -> Result<Arc<dyn IndexSnapshot>, ProviderError> {
        let slot = self
            .indices
            .get(&index)
            .ok_or(ProviderError::NotHosted { index })?;
        let guard = slot.read().await;
        Ok(Arc::clone(&*guard) as Arc<dyn IndexSnapshot>)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkId, LicenseTag, SourceMeta};

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

    fn science_provider(chunks: Vec<Chunk>) -> MemoryIndexProvider {
        MemoryIndexProvider::new().with_index(IndexName::Science, chunks)
    }

    // -- scoring tests -------------------------------------------------------

    #[tokio::test]
    async fn search_ranks_by_token_overlap() {
        let provider = science_provider(vec![
            chunk("a", "progressive overload drives strength gains"),
            chunk("b", "protein intake supports recovery"),
            chunk("c", "strength training frequency and overload"),
        ]);
        let snap = provider.snapshot(IndexName::Science).await.unwrap();
        let hits = snap.search("strength overload", 10).await.unwrap();

        // "a" and "c" both match both terms; "b" matches neither.
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id.as_str(), "a");
        assert_eq!(hits[1].chunk.id.as_str(), "c");
        assert!((hits[0].score - hits[1].score).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn search_breaks_score_ties_by_chunk_id() {
        let provider = science_provider(vec![
            chunk("z:2", "deload week planning"),
            chunk("a:1", "deload week planning"),
            chunk("m:9", "deload week planning"),
        ]);
        let snap = provider.snapshot(IndexName::Science).await.unwrap();
        let hits = snap.search("deload week", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a:1", "m:9", "z:2"]);
    }

    #[tokio::test]
    async fn search_truncates_to_k() {
        let provider = science_provider(vec![
            chunk("a", "squat volume"),
            chunk("b", "squat volume"),
            chunk("c", "squat volume"),
        ]);
        let snap = provider.snapshot(IndexName::Science).await.unwrap();
        let hits = snap.search("squat", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn search_drops_zero_score_chunks() {
        let provider = science_provider(vec![chunk("a", "hypertrophy mechanisms")]);
        let snap = provider.snapshot(IndexName::Science).await.unwrap();
        let hits = snap.search("unrelated query terms", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    // -- snapshot lifecycle tests ---------------------------------------------

    #[tokio::test]
    async fn rebuild_bumps_version_and_swaps_content() {
        let provider = science_provider(vec![chunk("old", "old evidence text")]);
        let v1 = provider.snapshot(IndexName::Science).await.unwrap();
        assert_eq!(v1.version(), SnapshotVersion(1));

        let v2 = provider
            .rebuild(IndexName::Science, vec![chunk("new", "new evidence text")])
            .await
            .unwrap();
        assert_eq!(v2, SnapshotVersion(2));

        let snap = provider.snapshot(IndexName::Science).await.unwrap();
        let hits = snap.search("evidence text", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id.as_str(), "new");
    }

    #[tokio::test]
    async fn pinned_snapshot_survives_rebuild() {
        let provider = science_provider(vec![chunk("old", "pinned evidence text")]);
        let pinned = provider.snapshot(IndexName::Science).await.unwrap();

        provider
            .rebuild(IndexName::Science, vec![chunk("new", "replacement text")])
            .await
            .unwrap();

        // The pinned snapshot still serves the old corpus at the old version.
        let hits = pinned.search("pinned evidence", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id.as_str(), "old");
        assert_eq!(pinned.version(), SnapshotVersion(1));
    }

    #[tokio::test]
    async fn unhosted_index_is_not_hosted_error() {
        let provider = science_provider(vec![]);
        let err = provider.snapshot(IndexName::Plans).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotHosted { index } if index == IndexName::Plans));
    }

    #[tokio::test]
    async fn rebuild_of_unhosted_index_fails() {
        let provider = MemoryIndexProvider::new();
        let err = provider
            .rebuild(IndexName::Science, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotHosted { .. }));
    }
}
