//! Capability requests and the service that answers them.
//!
//! Every inbound body is one [`SubstrateRequest`], tagged by `action`. The
//! response always reflects the primary operation: validation problems come
//! back as `200 {status:"skipped"}`, upstream failures as
//! `500 {status:"error"}`, and best-effort work (trace persistence, cache
//! mirroring, notification delivery) never changes either.

use std::fmt;
use std::sync::Arc;

use agent_memory::{
    EmbeddingProvider, MemoryError, MemoryStore, NewMemory, backfill_embeddings,
};
use agent_policy::{EscalationEvent, EscalationRouter, EscalationSignal};
use agent_primitives::AgentId;
use agent_telemetry::TraceRecorder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dispatch::{DispatchClient, DispatchError};
use crate::sync::{SyncCoordinator, SyncError};

const MIN_QUERY_CHARS: usize = 2;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_MATCH_THRESHOLD: f32 = 0.7;
const DEFAULT_BACKFILL_BATCH: usize = 10;

/// One capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubstrateRequest {
    /// Append a memory.
    Write {
        /// The memory to store.
        #[serde(flatten)]
        memory: NewMemory,
    },
    /// Text search ranked by importance.
    Search {
        /// Substring to look for; at least two characters.
        query: String,
        /// Maximum number of results.
        #[serde(default = "default_search_limit")]
        limit: usize,
    },
    /// Embeds `query` and runs a similarity search.
    SemanticSearch {
        /// Natural-language query.
        query: String,
        /// Maximum number of results.
        #[serde(default = "default_search_limit")]
        limit: usize,
        /// Minimum similarity.
        #[serde(default = "default_match_threshold")]
        threshold: f32,
    },
    /// Embeds records that are still missing a vector.
    Backfill {
        /// Number of records to select.
        #[serde(default = "default_backfill_batch")]
        batch_size: usize,
    },
    /// Runs a full sync cycle, merging `state` into the aggregate.
    Sync {
        /// Caller-supplied state.
        #[serde(default)]
        state: Map<String, Value>,
    },
    /// Reads the cached summaries.
    Restore,
    /// Records one provenance step.
    Trace {
        /// Who handed the message over.
        passer: String,
        /// Who handled it.
        agent: String,
        /// Who received the result.
        receiver: String,
        /// What was done.
        operation: String,
        /// Status string; `OK` when absent.
        #[serde(default)]
        result: Option<String>,
    },
    /// Raises an urgency or trust signal.
    Escalate {
        /// `{"urgency": n}` or `{"trust_score": n}`.
        #[serde(flatten)]
        signal: EscalationSignal,
        /// Human-readable text.
        message: String,
        /// Who raised it.
        #[serde(default)]
        source: String,
    },
    /// Hands work to another agent.
    Dispatch {
        /// Receiving agent.
        target: AgentId,
        /// What the target should do.
        intent: String,
        /// Intent payload.
        #[serde(default)]
        request: Value,
    },
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_match_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_backfill_batch() -> usize {
    DEFAULT_BACKFILL_BATCH
}

impl SubstrateRequest {
    /// Wire name of the action.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Search { .. } => "search",
            Self::SemanticSearch { .. } => "semantic_search",
            Self::Backfill { .. } => "backfill",
            Self::Sync { .. } => "sync",
            Self::Restore => "restore",
            Self::Trace { .. } => "trace",
            Self::Escalate { .. } => "escalate",
            Self::Dispatch { .. } => "dispatch",
        }
    }
}

/// Ways a request can fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Input was missing or unusable; the operation was skipped.
    #[error("{0}")]
    Validation(String),
    /// A dependency failed while performing the primary operation.
    #[error("{0}")]
    Upstream(String),
}

impl HandlerError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Creates an upstream error.
    #[must_use]
    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream(reason.into())
    }
}

impl From<MemoryError> for HandlerError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::InvalidRecord(_) => Self::Validation(err.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<SyncError> for HandlerError {
    fn from(err: SyncError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<DispatchError> for HandlerError {
    fn from(err: DispatchError) -> Self {
        Self::Upstream(err.to_string())
    }
}

/// Result alias for handler operations.
pub type HandlerResult<T = Value> = Result<T, HandlerError>;

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResponse {
    /// 200 or 500; nothing else is used.
    pub status_code: u16,
    /// JSON body.
    pub body: Value,
}

impl HandlerResponse {
    /// Successful response wrapping `result`.
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            status_code: 200,
            body: json!({"status": "ok", "result": result}),
        }
    }

    /// Returns `true` for a 200 response.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

impl From<HandlerError> for HandlerResponse {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Validation(reason) => Self {
                status_code: 200,
                body: json!({"status": "skipped", "reason": reason}),
            },
            HandlerError::Upstream(error) => Self {
                status_code: 500,
                body: json!({"status": "error", "error": error}),
            },
        }
    }
}

/// Answers [`SubstrateRequest`]s on behalf of one agent.
pub struct SubstrateService {
    agent_id: AgentId,
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    sync: Arc<SyncCoordinator>,
    router: Arc<EscalationRouter>,
    dispatcher: Option<Arc<dyn DispatchClient>>,
    recorder: TraceRecorder,
}

impl fmt::Debug for SubstrateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubstrateService")
            .field("agent_id", &self.agent_id)
            .field("embeddings", &self.embedder.is_some())
            .field("dispatch", &self.dispatcher.is_some())
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl SubstrateService {
    /// Creates a service. Traces are persisted into `store`.
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        store: Arc<dyn MemoryStore>,
        sync: Arc<SyncCoordinator>,
        router: Arc<EscalationRouter>,
    ) -> Self {
        let recorder = TraceRecorder::new(agent_id.as_str()).with_store(Arc::clone(&store));
        Self {
            agent_id,
            store,
            embedder: None,
            sync,
            router,
            dispatcher: None,
            recorder,
        }
    }

    /// Enables semantic search and backfill.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Enables agent dispatch.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn DispatchClient>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Returns the agent this service answers for.
    #[must_use]
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Decodes and answers a raw JSON body.
    ///
    /// A body that is not a well-formed request is a validation failure.
    pub async fn handle_json(&self, body: &[u8]) -> HandlerResponse {
        match serde_json::from_slice::<SubstrateRequest>(body) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                debug!(%err, "rejected malformed request");
                HandlerError::validation(format!("malformed request: {err}")).into()
            }
        }
    }

    /// Answers a decoded request.
    pub async fn handle(&self, request: SubstrateRequest) -> HandlerResponse {
        let action = request.action();
        match self.execute(request).await {
            Ok(result) => HandlerResponse::ok(result),
            Err(err) => {
                match &err {
                    HandlerError::Validation(reason) => {
                        debug!(action, %reason, "request skipped");
                    }
                    HandlerError::Upstream(error) => {
                        warn!(action, %error, "request failed");
                    }
                }
                err.into()
            }
        }
    }

    async fn execute(&self, request: SubstrateRequest) -> HandlerResult {
        match request {
            SubstrateRequest::Write { memory } => {
                let record = self.store.write(memory).await?;
                to_value(&record)
            }
            SubstrateRequest::Search { query, limit } => {
                let query = checked_query(&query)?;
                to_value(&self.store.text_search(query, limit).await?)
            }
            SubstrateRequest::SemanticSearch {
                query,
                limit,
                threshold,
            } => {
                let query = checked_query(&query)?;
                let embedder = self.embedder()?;
                let embedding = embedder.embed(query).await?;
                let matches = self
                    .store
                    .semantic_search(&embedding, limit, threshold)
                    .await?;
                to_value(&matches)
            }
            SubstrateRequest::Backfill { batch_size } => {
                if batch_size == 0 {
                    return Err(HandlerError::validation("batch_size must be positive"));
                }
                let embedder = self.embedder()?;
                let report =
                    backfill_embeddings(self.store.as_ref(), embedder.as_ref(), batch_size).await?;
                to_value(&report)
            }
            SubstrateRequest::Sync { state } => to_value(&self.sync.sync_all(state).await?),
            SubstrateRequest::Restore => to_value(&self.sync.restore().await),
            SubstrateRequest::Trace {
                passer,
                agent,
                receiver,
                operation,
                result,
            } => {
                let entry =
                    self.recorder
                        .record(&passer, &agent, &receiver, &operation, result.as_deref());
                let persisted = self.recorder.persist(&entry).await.is_some();
                Ok(json!({"entry": entry, "persisted": persisted}))
            }
            SubstrateRequest::Escalate {
                signal,
                message,
                source,
            } => {
                if message.trim().is_empty() {
                    return Err(HandlerError::validation("message must not be empty"));
                }
                let source = if source.is_empty() {
                    self.agent_id.to_string()
                } else {
                    source
                };
                let event = EscalationEvent::new(signal, message, source);
                to_value(&self.router.route(&event).await)
            }
            SubstrateRequest::Dispatch {
                target,
                intent,
                request,
            } => self.dispatch(&target, &intent, request).await,
        }
    }

    async fn dispatch(&self, target: &AgentId, intent: &str, request: Value) -> HandlerResult {
        if intent.trim().is_empty() {
            return Err(HandlerError::validation("intent must not be empty"));
        }
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or_else(|| HandlerError::upstream("no dispatch client configured"))?;

        let outcome = dispatcher.dispatch(target, intent, request).await;
        let status = match &outcome {
            Ok(_) => None,
            Err(err) => Some(format!("ERROR: {err}")),
        };
        let entry = self.recorder.record(
            self.agent_id.as_str(),
            target.as_str(),
            self.agent_id.as_str(),
            &format!("dispatch:{intent}"),
            status.as_deref(),
        );
        self.recorder.persist(&entry).await;

        Ok(outcome?)
    }

    fn embedder(&self) -> HandlerResult<&Arc<dyn EmbeddingProvider>> {
        self.embedder
            .as_ref()
            .ok_or_else(|| HandlerError::upstream("no embedding provider configured"))
    }
}

fn checked_query(query: &str) -> HandlerResult<&str> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(HandlerError::validation(format!(
            "query must be at least {MIN_QUERY_CHARS} characters"
        )));
    }
    Ok(query)
}

fn to_value<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|err| HandlerError::upstream(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agent_config::PolicyTable;
    use agent_memory::{
        EmbeddingVector, InMemoryCache, InMemoryStore, MemoryRecord, MemoryResult, MemoryType,
        ScoredRecord, TRACE_TAG,
    };
    use agent_policy::{Notification, NotificationChannel, PolicyResult};
    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::dispatch::DispatchResult;

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
            if text.to_lowercase().contains("job") {
                EmbeddingVector::new(vec![1.0, 0.0])
            } else {
                EmbeddingVector::new(vec![0.0, 1.0])
            }
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        fn max_message_len(&self) -> usize {
            160
        }

        async fn deliver(&self, _notification: &Notification) -> PolicyResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct EchoDispatcher {
        fail: bool,
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DispatchClient for EchoDispatcher {
        async fn dispatch(
            &self,
            target: &AgentId,
            intent: &str,
            request: Value,
        ) -> DispatchResult<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((target.to_string(), intent.to_owned()));
            if self.fail {
                return Err(DispatchError::Upstream {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(json!({"echo": request}))
        }
    }

    /// Serves reads from an inner store but rejects every write.
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: InMemoryStore,
        rejected: AtomicUsize,
    }

    #[async_trait]
    impl MemoryStore for ReadOnlyStore {
        async fn write(&self, _memory: NewMemory) -> MemoryResult<MemoryRecord> {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            Err(MemoryError::persistence("insert rejected: 503"))
        }

        async fn get(&self, id: Uuid) -> MemoryResult<MemoryRecord> {
            self.inner.get(id).await
        }

        async fn text_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            self.inner.text_search(query, limit).await
        }

        async fn semantic_search(
            &self,
            query: &EmbeddingVector,
            limit: usize,
            threshold: f32,
        ) -> MemoryResult<Vec<ScoredRecord>> {
            self.inner.semantic_search(query, limit, threshold).await
        }

        async fn missing_embeddings(&self, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            self.inner.missing_embeddings(limit).await
        }

        async fn set_embedding(&self, id: Uuid, embedding: EmbeddingVector) -> MemoryResult<()> {
            self.inner.set_embedding(id, embedding).await
        }

        async fn count_tagged(&self, tag: &str) -> MemoryResult<usize> {
            self.inner.count_tagged(tag).await
        }

        async fn recent_tagged(&self, tag: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
            self.inner.recent_tagged(tag, limit).await
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        channel: Arc<RecordingChannel>,
        service: SubstrateService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let channel = Arc::new(RecordingChannel::default());
        let policy = PolicyTable::default();
        let sync = Arc::new(SyncCoordinator::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            policy,
        ));
        let router = Arc::new(EscalationRouter::new(policy).with_channel(channel.clone()));
        let service = SubstrateService::new("scout".parse().unwrap(), store.clone(), sync, router);
        Fixture {
            store,
            channel,
            service,
        }
    }

    async fn call(service: &SubstrateService, body: Value) -> HandlerResponse {
        service.handle_json(body.to_string().as_bytes()).await
    }

    #[test]
    fn requests_are_tagged_by_action() {
        let request: SubstrateRequest = serde_json::from_value(json!({
            "action": "write",
            "content": "JOB ALERT: Widget Co",
            "memory_type": "user",
            "importance": 7,
            "tags": ["job_alert"],
        }))
        .unwrap();
        assert_eq!(request.action(), "write");

        let request: SubstrateRequest =
            serde_json::from_value(json!({"action": "escalate", "urgency": 9, "message": "down"}))
                .unwrap();
        assert!(matches!(
            request,
            SubstrateRequest::Escalate {
                signal: EscalationSignal::Urgency(_),
                ..
            }
        ));

        let request: SubstrateRequest =
            serde_json::from_value(json!({"action": "semantic_search", "query": "jobs"})).unwrap();
        assert_eq!(
            request,
            SubstrateRequest::SemanticSearch {
                query: "jobs".into(),
                limit: 10,
                threshold: 0.7,
            }
        );
    }

    #[tokio::test]
    async fn write_then_search_ranks_by_importance() {
        let fx = fixture();
        for (content, importance) in [("job fair flyer", 3), ("JOB ALERT: Widget Co", 7)] {
            let response = call(
                &fx.service,
                json!({"action": "write", "content": content, "memory_type": "user", "importance": importance}),
            )
            .await;
            assert!(response.is_success());
        }

        let response = call(&fx.service, json!({"action": "search", "query": "job"})).await;
        let results = response.body["result"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["content"], "JOB ALERT: Widget Co");
    }

    #[tokio::test]
    async fn short_query_is_skipped() {
        let fx = fixture();
        let response = call(&fx.service, json!({"action": "search", "query": "j"})).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["status"], "skipped");
    }

    #[tokio::test]
    async fn malformed_body_is_skipped_not_failed() {
        let fx = fixture();
        let response = fx.service.handle_json(b"{\"action\":\"search\"}").await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["status"], "skipped");

        let response = call(&fx.service, json!({"action": "escalate", "urgency": 11, "message": "x"})).await;
        assert_eq!(response.body["status"], "skipped");
        assert_eq!(fx.channel.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_content_is_a_validation_failure() {
        let fx = fixture();
        let response = call(
            &fx.service,
            json!({"action": "write", "content": "  ", "memory_type": "user"}),
        )
        .await;
        assert_eq!(response.body["status"], "skipped");
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn semantic_search_without_provider_is_an_error() {
        let fx = fixture();
        let response = call(&fx.service, json!({"action": "semantic_search", "query": "jobs"})).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body["status"], "error");
    }

    #[tokio::test]
    async fn semantic_search_embeds_the_query() {
        let fx = fixture();
        let service = fx.service.with_embedder(Arc::new(KeywordEmbedder));
        fx.store
            .write(
                NewMemory::new("job listing", MemoryType::User)
                    .embedding(EmbeddingVector::new(vec![1.0, 0.0]).unwrap()),
            )
            .await
            .unwrap();
        fx.store
            .write(
                NewMemory::new("grocery list", MemoryType::User)
                    .embedding(EmbeddingVector::new(vec![0.0, 1.0]).unwrap()),
            )
            .await
            .unwrap();

        let response = call(&service, json!({"action": "semantic_search", "query": "job"})).await;
        let results = response.body["result"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["record"]["content"], "job listing");
    }

    #[tokio::test]
    async fn backfill_reports_counts() {
        let fx = fixture();
        let service = fx.service.with_embedder(Arc::new(KeywordEmbedder));
        for i in 0..3 {
            fx.store
                .write(NewMemory::new(format!("note {i}"), MemoryType::User))
                .await
                .unwrap();
        }
        let response = call(&service, json!({"action": "backfill"})).await;
        assert_eq!(response.body["result"], json!({"processed": 3, "total": 3}));
    }

    #[tokio::test]
    async fn escalation_goes_through_policy() {
        let fx = fixture();
        call(&fx.service, json!({"action": "escalate", "urgency": 7, "message": "meh"})).await;
        assert_eq!(fx.channel.calls.load(Ordering::SeqCst), 0);

        let response =
            call(&fx.service, json!({"action": "escalate", "urgency": 8, "message": "interview"})).await;
        assert_eq!(fx.channel.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.body["result"]["decision"], "deliver");

        call(&fx.service, json!({"action": "escalate", "trust_score": 60, "message": "3/5"})).await;
        assert_eq!(fx.channel.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn trace_is_persisted() {
        let fx = fixture();
        let response = call(
            &fx.service,
            json!({"action": "trace", "passer": "mail", "agent": "scout", "receiver": "user", "operation": "classify"}),
        )
        .await;
        assert_eq!(response.body["result"]["persisted"], true);
        assert_eq!(response.body["result"]["entry"]["notation"], "mail*scout*user");
        assert_eq!(fx.store.count_tagged(TRACE_TAG).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sync_and_restore() {
        let fx = fixture();
        let cold = call(&fx.service, json!({"action": "restore"})).await;
        assert_eq!(
            cold.body["result"],
            json!({"state": null, "agents": null, "traces": null})
        );

        let response = call(&fx.service, json!({"action": "sync", "state": {"mode": "quiet"}})).await;
        assert!(response.is_success());
        assert_eq!(response.body["result"]["mode"], "quiet");

        let warm = call(&fx.service, json!({"action": "restore"})).await;
        assert_eq!(warm.body["result"]["state"]["mode"], "quiet");
    }

    #[tokio::test]
    async fn dispatch_passes_answer_through_and_traces() {
        let fx = fixture();
        let dispatcher = Arc::new(EchoDispatcher::default());
        let service = fx.service.with_dispatcher(dispatcher.clone());

        let response = call(
            &service,
            json!({"action": "dispatch", "target": "voice", "intent": "speak", "request": {"text": "hi"}}),
        )
        .await;
        assert_eq!(response.body["result"], json!({"echo": {"text": "hi"}}));
        assert_eq!(
            dispatcher.seen.lock().unwrap().as_slice(),
            [("voice".to_owned(), "speak".to_owned())]
        );

        let traces = fx.store.recent_tagged(TRACE_TAG, 10).await.unwrap();
        assert_eq!(traces.len(), 1);
        assert!(traces[0].content().contains("dispatch:speak"));
    }

    #[tokio::test]
    async fn dispatch_failure_is_an_error() {
        let fx = fixture();
        let service = fx.service.with_dispatcher(Arc::new(EchoDispatcher {
            fail: true,
            ..EchoDispatcher::default()
        }));

        let response = call(
            &service,
            json!({"action": "dispatch", "target": "voice", "intent": "speak"}),
        )
        .await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body["status"], "error");

        let traces = fx.store.recent_tagged(TRACE_TAG, 10).await.unwrap();
        assert!(traces[0].content().contains("ERROR"));
    }

    #[tokio::test]
    async fn out_of_range_importance_is_clamped_not_skipped() {
        let fx = fixture();
        for (raw, expected) in [("18446744073709551615", 10), ("7.5", 7), ("-1e30", 1)] {
            let body = format!(
                r#"{{"action":"write","content":"importance {raw}","memory_type":"user","importance":{raw}}}"#
            );
            let response = fx.service.handle_json(body.as_bytes()).await;
            assert_eq!(response.body["status"], "ok", "input {raw}: {}", response.body);
            assert_eq!(response.body["result"]["importance"], expected, "input {raw}");
        }

        let stored = fx.store.text_search("importance", 10).await.unwrap();
        let mut levels: Vec<u8> = stored.iter().map(MemoryRecord::importance).collect();
        levels.sort_unstable();
        assert_eq!(levels, [1, 7, 10]);
    }

    #[tokio::test]
    async fn store_rejection_is_an_error_without_side_effects() {
        let store = Arc::new(ReadOnlyStore::default());
        let channel = Arc::new(RecordingChannel::default());
        let policy = PolicyTable::default();
        let sync = Arc::new(SyncCoordinator::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            policy,
        ));
        let router = Arc::new(EscalationRouter::new(policy).with_channel(channel.clone()));
        let service = SubstrateService::new("scout".parse().unwrap(), store.clone(), sync, router);

        let response = call(
            &service,
            json!({"action": "write", "content": "JOB ALERT: Widget Co", "memory_type": "user", "importance": 9}),
        )
        .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body["status"], "error");
        assert!(
            response.body["error"]
                .as_str()
                .unwrap()
                .contains("insert rejected")
        );
        assert_eq!(store.rejected.load(Ordering::SeqCst), 1);
        assert!(store.inner.is_empty().await);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 0);
    }
}
