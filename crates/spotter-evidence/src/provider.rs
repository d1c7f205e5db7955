//! Index provider abstraction.
//!
//! Index internals (embedding, ANN structures, storage) live behind these
//! traits. The engine only ever sees pinned snapshots: an immutable view of
//! one index at one version, so a rebuild completing mid-request can never
//! change what that request retrieves.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::chunk::{Chunk, IndexName, SnapshotVersion};

/// A scored hit returned by a snapshot search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Errors surfaced by index providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider does not host the requested index.
    #[error("index {index} is not hosted by this provider")]
    NotHosted { index: IndexName },

    /// The index exists but cannot serve queries right now.
    #[error("index {index} unavailable: {detail}")]
    Unavailable { index: IndexName, detail: String },

    /// The search did not complete within the per-index budget.
    #[error("search on index {index} timed out after {elapsed_ms}ms")]
    Timeout { index: IndexName, elapsed_ms: u64 },
}

impl ProviderError {
    pub fn index(&self) -> IndexName {
        match self {
            Self::NotHosted { index }
            | Self::Unavailable { index, .. }
            | Self::Timeout { index, .. } => *index,
        }
    }
}

/// An immutable view of one index at a fixed version.
#[async_trait]
pub trait IndexSnapshot: Send + Sync + std::fmt::Debug {
    fn index(&self) -> IndexName;

    fn version(&self) -> SnapshotVersion;

    /// Number of chunks held by this snapshot.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` chunks relevant to `query`, highest score first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ProviderError>;
}

/// Source of evidence indices.
#[async_trait]
pub trait IndexProvider: Send + Sync {
    /// Pin the current snapshot of `index`.
    async fn snapshot(&self, index: IndexName) -> Result<Arc<dyn IndexSnapshot>, ProviderError>;
}

// The retriever holds providers and snapshots as trait objects.
const _: () = {
    fn _assert_object_safe(_: &dyn IndexProvider, _: &dyn IndexSnapshot) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
