//! Embedding backfill for records written without a vector.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::MemoryResult;
use crate::embeddings::{EmbeddingProvider, truncate_for_embedding};
use crate::store::MemoryStore;

/// Outcome of a backfill batch; `processed <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Records that received an embedding.
    pub processed: usize,
    /// Records selected for the batch.
    pub total: usize,
}

/// Embeds up to `batch_size` records that have no embedding yet.
///
/// A failure on one record is logged and skipped; the rest of the batch still
/// runs. Only a failure to select the batch is returned as an error.
///
/// # Errors
///
/// Propagates the store error when the batch cannot be selected.
pub async fn backfill_embeddings(
    store: &dyn MemoryStore,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> MemoryResult<BackfillReport> {
    let pending = store.missing_embeddings(batch_size).await?;
    let total = pending.len();
    let mut processed = 0;

    for record in pending {
        let embedding = match provider.embed(truncate_for_embedding(record.content())).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(id = %record.id(), %err, "embedding generation failed; skipping record");
                continue;
            }
        };

        match store.set_embedding(record.id(), embedding).await {
            Ok(()) => {
                processed += 1;
                debug!(id = %record.id(), "embedding backfilled");
            }
            Err(err) => {
                warn!(id = %record.id(), %err, "embedding update failed; skipping record");
            }
        }
    }

    info!(processed, total, "embedding backfill finished");
    Ok(BackfillReport { processed, total })
}
