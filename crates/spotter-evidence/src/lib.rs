//! Evidence layer: chunked source material behind versioned, swappable
//! indices, plus the retrieval and reranking passes that turn a query into
//! a deterministic, deduplicated context set.

pub mod chunk;
pub mod memory;
pub mod provider;
pub mod rerank;
pub mod retrieval;

pub use chunk::{Chunk, ChunkId, IndexName, LicenseTag, SnapshotVersion, SourceMeta};
pub use memory::MemoryIndexProvider;
pub use provider::{IndexProvider, IndexSnapshot, ProviderError, SearchHit};
pub use rerank::{RelevanceScorer, RerankConfig, Reranker, ScorerError};
pub use retrieval::{RetrievalConfig, RetrievalError, RetrievalSet, RetrievedChunk, Retriever};
