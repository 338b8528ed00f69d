//! The shared memory store interface and its ranking contract.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MemoryResult;
use crate::embeddings::EmbeddingVector;
use crate::record::{MemoryRecord, NewMemory};

/// Record returned by a similarity search together with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Matching record.
    pub record: MemoryRecord,
    /// Cosine similarity to the query vector.
    pub similarity: f32,
}

/// Durable, append-oriented record store shared by every agent.
///
/// Records are never deleted. After a write the only permitted mutation is
/// [`MemoryStore::set_embedding`] on a record that has no embedding yet.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persists a memory, assigning its id and timestamps.
    ///
    /// Rejections by the underlying store surface as
    /// [`MemoryError::Persistence`](crate::MemoryError::Persistence).
    async fn write(&self, memory: NewMemory) -> MemoryResult<MemoryRecord>;

    /// Reads a record by id.
    async fn get(&self, id: Uuid) -> MemoryResult<MemoryRecord>;

    /// Text search ranked by importance, then most recent first.
    async fn text_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>>;

    /// Similarity search over records that carry an embedding.
    ///
    /// Only records scoring at least `threshold` are returned, best first.
    async fn semantic_search(
        &self,
        query: &EmbeddingVector,
        limit: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<ScoredRecord>>;

    /// Returns up to `limit` records whose embedding is still missing.
    async fn missing_embeddings(&self, limit: usize) -> MemoryResult<Vec<MemoryRecord>>;

    /// Fills in the embedding of a record that has none.
    async fn set_embedding(&self, id: Uuid, embedding: EmbeddingVector) -> MemoryResult<()>;

    /// Counts records carrying `tag`.
    async fn count_tagged(&self, tag: &str) -> MemoryResult<usize>;

    /// Returns the `limit` most recent records carrying `tag`, newest first.
    async fn recent_tagged(&self, tag: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>>;
}

/// Orders records by importance descending, then `created_at` descending.
pub fn rank_by_importance(records: &mut [MemoryRecord]) {
    records.sort_by(|a, b| {
        b.importance()
            .cmp(&a.importance())
            .then_with(|| b.created_at().cmp(&a.created_at()))
    });
}

/// Orders scored records by similarity descending.
pub fn rank_by_similarity(records: &mut [ScoredRecord]) {
    records.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::record::MemoryType;

    fn record(importance: i64, age_secs: i64) -> MemoryRecord {
        NewMemory::new("job", MemoryType::User)
            .importance(importance)
            .stamp(Uuid::new_v4(), Utc::now() - Duration::seconds(age_secs))
            .unwrap()
    }

    #[test]
    fn importance_beats_recency() {
        let mut records = vec![record(3, 0), record(7, 100), record(7, 10)];
        rank_by_importance(&mut records);

        assert_eq!(records[0].importance(), 7);
        assert_eq!(records[1].importance(), 7);
        assert!(records[0].created_at() > records[1].created_at());
        assert_eq!(records[2].importance(), 3);
    }

    #[test]
    fn similarity_orders_descending() {
        let mut scored = vec![
            ScoredRecord { record: record(5, 0), similarity: 0.2 },
            ScoredRecord { record: record(5, 0), similarity: 0.9 },
            ScoredRecord { record: record(5, 0), similarity: 0.5 },
        ];
        rank_by_similarity(&mut scored);
        let order: Vec<f32> = scored.iter().map(|s| s.similarity).collect();
        assert_eq!(order, vec![0.9, 0.5, 0.2]);
    }
}
