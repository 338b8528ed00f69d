//! Process-local memory store.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::embeddings::EmbeddingVector;
use crate::record::{MemoryRecord, NewMemory};
use crate::store::{MemoryStore, ScoredRecord, rank_by_importance, rank_by_similarity};
use crate::{MemoryError, MemoryResult};

/// In-memory [`MemoryStore`] using case-insensitive substring matching and
/// locally computed cosine similarity.
///
/// Records are kept in write order; iterating newest-first before the stable
/// ranking sort keeps same-timestamp ties most-recent-first.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when nothing has been written.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn write(&self, memory: NewMemory) -> MemoryResult<MemoryRecord> {
        let record = memory.stamp(Uuid::new_v4(), Utc::now())?;
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> MemoryResult<MemoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.id() == id)
            .cloned()
            .ok_or(MemoryError::NotFound(id))
    }

    async fn text_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let needle = query.to_lowercase();
        let guard = self.records.read().await;
        let mut matches: Vec<MemoryRecord> = guard
            .iter()
            .rev()
            .filter(|record| record.content().to_lowercase().contains(&needle))
            .cloned()
            .collect();
        drop(guard);

        rank_by_importance(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn semantic_search(
        &self,
        query: &EmbeddingVector,
        limit: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<ScoredRecord>> {
        let guard = self.records.read().await;
        let mut matches: Vec<ScoredRecord> = guard
            .iter()
            .filter_map(|record| {
                let embedding = record.embedding()?;
                if embedding.len() != query.len() {
                    return None;
                }
                let similarity = embedding.cosine_similarity(query);
                (similarity >= threshold).then(|| ScoredRecord {
                    record: record.clone(),
                    similarity,
                })
            })
            .collect();
        drop(guard);

        rank_by_similarity(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn missing_embeddings(&self, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.embedding().is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_embedding(&self, id: Uuid, embedding: EmbeddingVector) -> MemoryResult<()> {
        let mut guard = self.records.write().await;
        let record = guard
            .iter_mut()
            .find(|record| record.id() == id)
            .ok_or(MemoryError::NotFound(id))?;
        if record.embedding().is_some() {
            return Err(MemoryError::InvalidRecord(
                "embedding already present; records are immutable once embedded",
            ));
        }
        record.attach_embedding(embedding, Utc::now());
        Ok(())
    }

    async fn count_tagged(&self, tag: &str) -> MemoryResult<usize> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.has_tag(tag))
            .count())
    }

    async fn recent_tagged(&self, tag: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let guard = self.records.read().await;
        let mut tagged: Vec<MemoryRecord> = guard
            .iter()
            .rev()
            .filter(|record| record.has_tag(tag))
            .cloned()
            .collect();
        drop(guard);

        tagged.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        tagged.truncate(limit);
        Ok(tagged)
    }
}
