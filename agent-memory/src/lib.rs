//! Shared memory for substrate agents.
//!
//! [`MemoryStore`] is the single source of truth every agent reads and
//! appends to. [`CacheLayer`] is a best-effort mirror of summarised store
//! state and is never consulted for correctness.

#![warn(missing_docs, clippy::pedantic)]

pub mod backfill;
pub mod cache;
pub mod embeddings;
mod error;
pub mod local;
pub mod record;
pub mod store;

pub use backfill::{BackfillReport, backfill_embeddings};
pub use cache::{CacheError, CacheKey, CacheLayer, CacheResult, InMemoryCache};
pub use embeddings::{
    EmbeddingProvider, EmbeddingVector, MAX_EMBEDDING_INPUT_CHARS, truncate_for_embedding,
};
pub use error::{MemoryError, MemoryResult};
pub use local::InMemoryStore;
pub use record::{
    AGENT_REGISTRY_TAG, MAX_IMPORTANCE, MIN_IMPORTANCE, MemoryRecord, MemoryType, NewMemory,
    TRACE_TAG, clamp_importance,
};
pub use store::{MemoryStore, ScoredRecord, rank_by_importance, rank_by_similarity};
