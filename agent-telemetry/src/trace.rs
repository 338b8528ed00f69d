//! Provenance traces for cross-agent messages.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use agent_memory::{MemoryRecord, MemoryResult, MemoryStore, MemoryType, NewMemory, TRACE_TAG};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::best_effort::best_effort;

/// Result recorded when the caller does not supply one.
pub const DEFAULT_RESULT: &str = "OK";

const SEPARATOR: char = '*';
const TRACE_IMPORTANCE: i64 = 2;

/// `passer*agent*receiver` triple. Downstream parsers split on `*` and rely
/// on this exact ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraceNotation {
    passer: String,
    agent: String,
    receiver: String,
}

impl TraceNotation {
    /// Builds a notation; a `*` inside a part is replaced with `_`.
    #[must_use]
    pub fn new(passer: &str, agent: &str, receiver: &str) -> Self {
        Self {
            passer: sanitize(passer),
            agent: sanitize(agent),
            receiver: sanitize(receiver),
        }
    }

    /// Who handed the message over.
    #[must_use]
    pub fn passer(&self) -> &str {
        &self.passer
    }

    /// Who handled it.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Who it was handed to.
    #[must_use]
    pub fn receiver(&self) -> &str {
        &self.receiver
    }
}

fn sanitize(part: &str) -> String {
    part.replace(SEPARATOR, "_")
}

impl fmt::Display for TraceNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.passer, self.agent, self.receiver
        )
    }
}

impl FromStr for TraceNotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(passer), Some(agent), Some(receiver), None) => Ok(Self {
                passer: passer.to_owned(),
                agent: agent.to_owned(),
                receiver: receiver.to_owned(),
            }),
            _ => Err(format!("trace notation `{s}` is not a passer*agent*receiver triple")),
        }
    }
}

impl TryFrom<String> for TraceNotation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TraceNotation> for String {
    fn from(value: TraceNotation) -> Self {
        value.to_string()
    }
}

/// One provenance step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Who passed what to whom.
    pub notation: TraceNotation,
    /// What was done.
    pub action: String,
    /// Status string, [`DEFAULT_RESULT`] unless supplied.
    pub result: String,
    /// When the entry was built.
    pub timestamp: DateTime<Utc>,
    /// Originating agent.
    pub agent: String,
}

impl TraceEntry {
    /// Recovers an entry from a record written by [`TraceRecorder::persist`].
    #[must_use]
    pub fn from_record(record: &MemoryRecord) -> Option<Self> {
        if !record.has_tag(TRACE_TAG) {
            return None;
        }
        serde_json::from_str(record.content()).ok()
    }
}

/// Builds trace entries for one agent and optionally persists them.
#[derive(Clone)]
pub struct TraceRecorder {
    agent: String,
    store: Option<Arc<dyn MemoryStore>>,
}

impl fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("agent", &self.agent)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl TraceRecorder {
    /// Creates a log-only recorder.
    #[must_use]
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            store: None,
        }
    }

    /// Persists entries into `store` as well as logging them.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds an entry. Pure construction; cannot fail.
    #[must_use]
    pub fn record(
        &self,
        passer: &str,
        agent: &str,
        receiver: &str,
        action: &str,
        result: Option<&str>,
    ) -> TraceEntry {
        let entry = TraceEntry {
            notation: TraceNotation::new(passer, agent, receiver),
            action: action.to_owned(),
            result: result.unwrap_or(DEFAULT_RESULT).to_owned(),
            timestamp: Utc::now(),
            agent: self.agent.clone(),
        };
        debug!(
            notation = %entry.notation,
            action = %entry.action,
            result = %entry.result,
            "trace recorded"
        );
        entry
    }

    /// Writes `entry` to the store when one is configured.
    ///
    /// Failures are logged and discarded. Returns the stored record on
    /// success, `None` otherwise (including log-only recorders).
    pub async fn persist(&self, entry: &TraceEntry) -> Option<MemoryRecord> {
        let Some(store) = &self.store else {
            info!(notation = %entry.notation, action = %entry.action, result = %entry.result, "trace");
            return None;
        };
        best_effort("trace.persist", self.write(store.as_ref(), entry)).await
    }

    async fn write(&self, store: &dyn MemoryStore, entry: &TraceEntry) -> MemoryResult<MemoryRecord> {
        let content = serde_json::to_string(entry)?;
        let memory = NewMemory::new(content, MemoryType::System)
            .importance(TRACE_IMPORTANCE)
            .system(true)
            .source(self.agent.clone())
            .tags([TRACE_TAG, self.agent.as_str()])?
            .categories([TRACE_TAG])?;
        store.write(memory).await
    }
}

#[cfg(test)]
mod tests {
    use agent_memory::{EmbeddingVector, InMemoryStore, MemoryError, ScoredRecord};
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;

    struct RejectingStore;

    #[async_trait]
    impl MemoryStore for RejectingStore {
        async fn write(&self, _memory: NewMemory) -> MemoryResult<MemoryRecord> {
            Err(MemoryError::persistence("connection reset"))
        }

        async fn get(&self, id: Uuid) -> MemoryResult<MemoryRecord> {
            Err(MemoryError::NotFound(id))
        }

        async fn text_search(&self, _query: &str, _limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            Ok(Vec::new())
        }

        async fn semantic_search(
            &self,
            _query: &EmbeddingVector,
            _limit: usize,
            _threshold: f32,
        ) -> MemoryResult<Vec<ScoredRecord>> {
            Ok(Vec::new())
        }

        async fn missing_embeddings(&self, _limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            Ok(Vec::new())
        }

        async fn set_embedding(&self, id: Uuid, _embedding: EmbeddingVector) -> MemoryResult<()> {
            Err(MemoryError::NotFound(id))
        }

        async fn count_tagged(&self, _tag: &str) -> MemoryResult<usize> {
            Ok(0)
        }

        async fn recent_tagged(&self, _tag: &str, _limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn notation_preserves_order() {
        let recorder = TraceRecorder::new("scout");
        let entry = recorder.record("user", "scout", "mail-proxy", "forward digest", None);
        assert_eq!(entry.notation.to_string(), "user*scout*mail-proxy");
        assert_eq!(entry.result, DEFAULT_RESULT);
        assert_eq!(entry.agent, "scout");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["notation"], "user*scout*mail-proxy");
    }

    #[test]
    fn separator_inside_parts_is_neutralised() {
        let notation = TraceNotation::new("a*b", "c", "d");
        assert_eq!(notation.to_string(), "a_b*c*d");
        assert!("a*b".parse::<TraceNotation>().is_err());
    }

    #[tokio::test]
    async fn persisted_entry_round_trips_through_store() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = TraceRecorder::new("scout").with_store(store.clone());
        let entry = recorder.record("user", "scout", "voice", "synthesize", Some("FAILED"));

        let record = recorder.persist(&entry).await.expect("stored");
        assert!(record.is_system());
        assert!(record.has_tag(TRACE_TAG));
        assert_eq!(record.source(), "scout");
        assert_eq!(TraceEntry::from_record(&record), Some(entry));
    }

    #[tokio::test]
    async fn persistence_failure_is_swallowed() {
        let recorder = TraceRecorder::new("scout").with_store(Arc::new(RejectingStore));
        let entry = recorder.record("a", "b", "c", "step", None);
        assert!(recorder.persist(&entry).await.is_none());
    }

    #[tokio::test]
    async fn log_only_recorder_persists_nothing() {
        let recorder = TraceRecorder::new("scout");
        let entry = recorder.record("a", "b", "c", "step", None);
        assert!(recorder.persist(&entry).await.is_none());
    }
}
