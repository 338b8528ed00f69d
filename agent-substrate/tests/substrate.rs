use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_substrate::config::{PolicyTable, SubstrateConfig};
use agent_substrate::kernel::{SubstrateService, SyncCoordinator};
use agent_substrate::memory::{
    BackfillReport, CacheError, CacheKey, CacheLayer, CacheResult, EmbeddingProvider,
    EmbeddingVector, InMemoryCache, InMemoryStore, MemoryError, MemoryResult, MemoryStore,
    MemoryType, NewMemory, backfill_embeddings,
};
use agent_substrate::policy::{
    EscalationRouter, Notification, NotificationChannel, PolicyResult, Urgency,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

#[derive(Default)]
struct CountingChannel {
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationChannel for CountingChannel {
    fn name(&self) -> &str {
        "counting"
    }

    fn max_message_len(&self) -> usize {
        160
    }

    async fn deliver(&self, _notification: &Notification) -> PolicyResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct DownCache;

#[async_trait]
impl CacheLayer for DownCache {
    async fn set(&self, _key: CacheKey, _value: &Value, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::transport("connection refused"))
    }

    async fn get(&self, _key: CacheKey) -> CacheResult<Option<Value>> {
        Err(CacheError::transport("connection refused"))
    }
}

/// Fails the second, fifth and ninth call.
#[derive(Default)]
struct FlakyEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, _text: &str) -> MemoryResult<EmbeddingVector> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if [1, 4, 8].contains(&call) {
            return Err(MemoryError::embedding("rate limited"));
        }
        EmbeddingVector::new(vec![0.1, 0.2, 0.3])
    }
}

#[tokio::test]
async fn importance_is_clamped_on_write() {
    let store = InMemoryStore::new();
    for (given, stored) in [(-4, 1), (0, 1), (1, 1), (6, 6), (10, 10), (11, 10), (500, 10)] {
        let record = store
            .write(NewMemory::new("note", MemoryType::User).importance(given))
            .await
            .unwrap();
        assert_eq!(record.importance(), stored, "importance {given}");
    }
}

#[tokio::test]
async fn written_record_reads_back() {
    let store = InMemoryStore::new();
    let written = store
        .write(
            NewMemory::new("prefers morning meetings", MemoryType::custom("preference").unwrap())
                .tags(["calendar", "user"])
                .unwrap()
                .categories(["scheduling"])
                .unwrap(),
        )
        .await
        .unwrap();

    let read = store.get(written.id()).await.unwrap();
    assert_eq!(read.content(), "prefers morning meetings");
    assert_eq!(read.memory_type().as_str(), "preference");
    assert_eq!(read.tags(), written.tags());
    assert_eq!(read.categories(), written.categories());
}

#[tokio::test]
async fn cold_restore_is_all_null() {
    let coordinator = SyncCoordinator::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCache::new()),
        PolicyTable::default(),
    );
    let restored = coordinator.restore().await;
    assert!(restored.is_cold());
    assert_eq!(
        serde_json::to_value(&restored).unwrap(),
        json!({"state": null, "agents": null, "traces": null})
    );
}

#[tokio::test]
async fn escalation_threshold_comes_from_config() {
    let config = SubstrateConfig::from_json_str(r#"{"policy": {"action_item_urgency": 8}}"#).unwrap();
    let channel = Arc::new(CountingChannel::default());
    let router = EscalationRouter::new(config.policy).with_channel(channel.clone());

    router
        .escalate(Urgency::new(7).unwrap(), "weekly digest ready", "scout")
        .await;
    assert_eq!(channel.calls.load(Ordering::SeqCst), 0);

    router
        .escalate(Urgency::new(8).unwrap(), "interview moved to 9am", "scout")
        .await;
    assert_eq!(channel.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sync_survives_an_unreachable_cache() {
    let store = Arc::new(InMemoryStore::new());
    store
        .write(
            NewMemory::new("scout online", MemoryType::System)
                .source("scout")
                .tag("agent_registry")
                .unwrap(),
        )
        .await
        .unwrap();
    let coordinator = SyncCoordinator::new(store, Arc::new(DownCache), PolicyTable::default())
        .with_cache_timeout(Duration::from_millis(200));

    let mut state = Map::new();
    state.insert("inbox_zero".into(), json!(true));
    let aggregate = coordinator.sync_all(state).await.unwrap();

    assert_eq!(aggregate.agents.total, 1);
    assert_eq!(aggregate.agents.agents, ["scout"]);
    assert_eq!(aggregate.traces.total, 0);
    assert_eq!(aggregate.state["inbox_zero"], json!(true));
    assert_eq!(coordinator.stats().completed_cycles, 1);
    assert!(coordinator.restore().await.is_cold());
}

#[tokio::test]
async fn backfill_counts_partial_failures() {
    let store = InMemoryStore::new();
    for i in 0..10 {
        store
            .write(NewMemory::new(format!("memory {i}"), MemoryType::User))
            .await
            .unwrap();
    }
    let embedder = FlakyEmbedder::default();

    let report = backfill_embeddings(&store, &embedder, 10).await.unwrap();
    assert_eq!(report, BackfillReport { processed: 7, total: 10 });
    assert_eq!(store.missing_embeddings(10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn text_search_prefers_importance() {
    let store = InMemoryStore::new();
    store
        .write(NewMemory::new("quarterly report draft", MemoryType::User).importance(7))
        .await
        .unwrap();
    store
        .write(NewMemory::new("quarterly report draft", MemoryType::User).importance(3))
        .await
        .unwrap();

    let results = store.text_search("report", 10).await.unwrap();
    let importance: Vec<u8> = results.iter().map(|record| record.importance()).collect();
    assert_eq!(importance, [7, 3]);
}

#[tokio::test]
async fn job_alert_ranks_above_low_importance_match() {
    let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    let policy = PolicyTable::default();
    let service = SubstrateService::new(
        "scout".parse().unwrap(),
        Arc::clone(&store),
        Arc::new(SyncCoordinator::new(
            Arc::clone(&store),
            Arc::new(InMemoryCache::new()),
            policy,
        )),
        Arc::new(EscalationRouter::new(policy)),
    );

    store
        .write(NewMemory::new("job board newsletter", MemoryType::User).importance(3))
        .await
        .unwrap();
    let response = service
        .handle_json(
            json!({
                "action": "write",
                "content": "JOB ALERT: Widget Co",
                "memory_type": "user",
                "importance": 7,
                "tags": ["job_alert"],
            })
            .to_string()
            .as_bytes(),
        )
        .await;
    assert!(response.is_success());

    let response = service
        .handle_json(br#"{"action": "search", "query": "job", "limit": 10}"#)
        .await;
    let results = response.body["result"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["content"], "JOB ALERT: Widget Co");
    assert_eq!(results[0]["tags"], json!(["job_alert"]));
    assert_eq!(results[1]["importance"], 3);
}
