//! Projection of memory store state into the cache, and boot-time restore.
//!
//! The store is the source of truth; every summary here is recomputed from it
//! on each call. The cache only ever receives copies, under last-write-wins,
//! so concurrent cycles (timer plus manual trigger) need no locking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use agent_config::{DEFAULT_REQUEST_TIMEOUT_SECS, MAX_TRACE_TAIL, PolicyTable};
use agent_memory::{
    AGENT_REGISTRY_TAG, CacheKey, CacheLayer, MemoryError, MemoryStore, MemoryType, NewMemory,
    TRACE_TAG,
};
use agent_telemetry::{TraceEntry, best_effort, best_effort_within};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::phase::{PhaseError, SyncCycle, SyncEvent};
use crate::scheduler::{SchedulerError, TaskScheduler};

/// Tag on the bookkeeping record written by each agent sync.
pub const SYNC_TAG: &str = "substrate_sync";

const SYNC_SOURCE: &str = "sync-coordinator";
const SYNC_IMPORTANCE: i64 = 1;

/// Errors surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The memory store could not be read.
    #[error(transparent)]
    Store(#[from] MemoryError),
    /// The cycle attempted an illegal phase transition.
    #[error(transparent)]
    Phase(#[from] PhaseError),
    /// The periodic task could not be scheduled.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result of one cache mirror write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// The cache accepted the value.
    Stored,
    /// The cache write failed or timed out; already logged.
    Failed,
}

/// Agent registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Registry records in the store.
    pub total: usize,
    /// Distinct sources among the most recent registry records.
    pub agents: Vec<String>,
    /// When the summary was computed.
    pub synced_at: DateTime<Utc>,
}

/// Recent trace snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Trace records read from the window.
    pub total: usize,
    /// Entry count per result string.
    pub by_result: BTreeMap<String, usize>,
    /// Newest entries first, capped at the policy tail size.
    pub tail: Vec<TraceEntry>,
    /// When the summary was computed.
    pub synced_at: DateTime<Utc>,
}

/// Caller state merged with both summaries.
///
/// Caller keys are flattened beside `agents`, `traces` and `synced_at`; a
/// caller key with one of those names is dropped in favour of the computed
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAggregate {
    /// Caller-supplied state.
    #[serde(flatten)]
    pub state: Map<String, Value>,
    /// Registry summary.
    pub agents: AgentSummary,
    /// Trace summary.
    pub traces: TraceSummary,
    /// When the aggregate was assembled.
    pub synced_at: DateTime<Utc>,
}

const RESERVED_AGGREGATE_KEYS: [&str; 3] = ["agents", "traces", "synced_at"];

/// Whatever the cache still holds. Missing pieces are `None`, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoredState {
    /// Last aggregate.
    pub state: Option<SyncAggregate>,
    /// Last registry summary.
    pub agents: Option<AgentSummary>,
    /// Last trace summary.
    pub traces: Option<TraceSummary>,
}

impl RestoredState {
    /// Returns `true` when nothing was restored.
    #[must_use]
    pub fn is_cold(&self) -> bool {
        self.state.is_none() && self.agents.is_none() && self.traces.is_none()
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Full cycles that reached `Idle` via the aggregate write.
    pub completed_cycles: u64,
    /// Cycles abandoned on a store failure.
    pub failed_cycles: u64,
    /// Cache writes that did not land.
    pub cache_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    completed_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    cache_failures: AtomicU64,
}

/// Mediates between the memory store and the cache.
pub struct SyncCoordinator {
    store: Arc<dyn MemoryStore>,
    cache: Arc<dyn CacheLayer>,
    policy: PolicyTable,
    cache_timeout: Duration,
    counters: Counters,
}

impl fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("policy", &self.policy)
            .field("cache_timeout", &self.cache_timeout)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Creates a coordinator. It is the only component that writes the cache.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        cache: Arc<dyn CacheLayer>,
        policy: PolicyTable,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            cache_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            counters: Counters::default(),
        }
    }

    /// Bounds every cache call.
    #[must_use]
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Returns the policy in force.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            completed_cycles: self.counters.completed_cycles.load(Ordering::Relaxed),
            failed_cycles: self.counters.failed_cycles.load(Ordering::Relaxed),
            cache_failures: self.counters.cache_failures.load(Ordering::Relaxed),
        }
    }

    /// Summarises the agent registry, mirrors it under [`CacheKey::Agents`]
    /// and records the sync in the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the registry cannot be read. Cache and
    /// bookkeeping failures are logged only.
    pub async fn sync_agents(&self) -> SyncResult<AgentSummary> {
        let total = self.store.count_tagged(AGENT_REGISTRY_TAG).await?;
        let recent = self
            .store
            .recent_tagged(AGENT_REGISTRY_TAG, self.policy.agent_window)
            .await?;
        let agents: BTreeSet<String> = recent
            .iter()
            .map(|record| record.source().to_owned())
            .filter(|source| !source.is_empty())
            .collect();

        let summary = AgentSummary {
            total,
            agents: agents.into_iter().collect(),
            synced_at: Utc::now(),
        };

        let cached = self
            .mirror(CacheKey::Agents, &summary, self.policy.agents_ttl())
            .await;
        self.record_sync(summary.total).await;
        debug!(total = summary.total, ?cached, "agent registry synced");
        Ok(summary)
    }

    /// Summarises the most recent trace records and mirrors them under
    /// [`CacheKey::Traces`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the traces cannot be read.
    pub async fn sync_traces(&self) -> SyncResult<TraceSummary> {
        let records = self
            .store
            .recent_tagged(TRACE_TAG, self.policy.trace_window)
            .await?;
        let tail_cap = self.policy.trace_tail_cap.min(MAX_TRACE_TAIL);

        let mut by_result = BTreeMap::new();
        let mut tail = Vec::new();
        for entry in records.iter().filter_map(TraceEntry::from_record) {
            *by_result.entry(entry.result.clone()).or_insert(0) += 1;
            if tail.len() < tail_cap {
                tail.push(entry);
            }
        }

        let summary = TraceSummary {
            total: records.len(),
            by_result,
            tail,
            synced_at: Utc::now(),
        };

        let cached = self
            .mirror(CacheKey::Traces, &summary, self.policy.traces_ttl())
            .await;
        debug!(total = summary.total, tail = summary.tail.len(), ?cached, "traces synced");
        Ok(summary)
    }

    /// Runs a full cycle and mirrors the aggregate under [`CacheKey::State`].
    ///
    /// The returned aggregate is derived from the store alone; it is complete
    /// even when every cache write failed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when either summary cannot be computed.
    pub async fn sync_all(&self, input_state: Map<String, Value>) -> SyncResult<SyncAggregate> {
        let mut cycle = SyncCycle::new();
        cycle.advance(SyncEvent::Start)?;

        match self.run_cycle(&mut cycle, input_state).await {
            Ok(aggregate) => {
                self.counters.completed_cycles.fetch_add(1, Ordering::Relaxed);
                info!(
                    agents = aggregate.agents.total,
                    traces = aggregate.traces.total,
                    "sync cycle complete"
                );
                Ok(aggregate)
            }
            Err(err) => {
                self.counters.failed_cycles.fetch_add(1, Ordering::Relaxed);
                if cycle.phase().is_busy() {
                    cycle.advance(SyncEvent::Fail)?;
                }
                warn!(error = %err, "sync cycle failed");
                Err(err)
            }
        }
    }

    async fn run_cycle(
        &self,
        cycle: &mut SyncCycle,
        mut state: Map<String, Value>,
    ) -> SyncResult<SyncAggregate> {
        let agents = self.sync_agents().await?;
        cycle.advance(SyncEvent::AgentsSynced)?;

        let traces = self.sync_traces().await?;
        cycle.advance(SyncEvent::TracesSynced)?;

        for key in RESERVED_AGGREGATE_KEYS {
            state.remove(key);
        }
        let aggregate = SyncAggregate {
            state,
            agents,
            traces,
            synced_at: Utc::now(),
        };
        let cached = self
            .mirror(CacheKey::State, &aggregate, self.policy.aggregate_ttl())
            .await;
        debug!(?cached, "aggregate mirrored");
        cycle.advance(SyncEvent::AggregateWritten)?;
        Ok(aggregate)
    }

    /// Reads the three well-known keys. Misses, cache failures and
    /// undecodable values all come back as `None`.
    pub async fn restore(&self) -> RestoredState {
        let (state, agents, traces) = futures::join!(
            self.fetch::<SyncAggregate>(CacheKey::State),
            self.fetch::<AgentSummary>(CacheKey::Agents),
            self.fetch::<TraceSummary>(CacheKey::Traces),
        );
        let restored = RestoredState {
            state,
            agents,
            traces,
        };
        info!(cold = restored.is_cold(), "cache restore finished");
        restored
    }

    /// Runs [`SyncCoordinator::sync_all`] every `sync_interval` on `scheduler`
    /// until the returned handle is stopped. Missed ticks are delayed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Scheduler`] when the scheduler is closed.
    pub fn spawn_periodic(self: &Arc<Self>, scheduler: &TaskScheduler) -> SyncResult<SyncHandle> {
        let coordinator = Arc::clone(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let period = self.policy.sync_interval();

        let worker = scheduler.spawn("periodic-sync", async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while !flag.load(Ordering::Acquire) {
                interval.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                if let Err(error) = coordinator.sync_all(Map::new()).await {
                    debug!(%error, "periodic sync cycle failed");
                }
            }
        })?;

        info!(interval_secs = period.as_secs(), "periodic sync started");
        Ok(SyncHandle {
            shutdown,
            worker: Some(worker),
        })
    }

    async fn mirror<T: Serialize + Sync>(&self, key: CacheKey, value: &T, ttl: Duration) -> CacheOutcome {
        let stored = best_effort_within("cache.set", self.cache_timeout, async {
            let value = serde_json::to_value(value)?;
            self.cache.set(key, &value, ttl).await
        })
        .await;

        if stored.is_some() {
            CacheOutcome::Stored
        } else {
            self.counters.cache_failures.fetch_add(1, Ordering::Relaxed);
            CacheOutcome::Failed
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let value = best_effort_within("cache.get", self.cache_timeout, self.cache.get(key))
            .await
            .flatten()?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(%key, error = %err, "cached value has unexpected shape; ignoring");
                None
            }
        }
    }

    async fn record_sync(&self, total: usize) {
        let memory = NewMemory::new(
            format!("agent registry synced: {total} agents"),
            MemoryType::System,
        )
        .importance(SYNC_IMPORTANCE)
        .system(true)
        .source(SYNC_SOURCE)
        .tags([SYNC_TAG]);

        best_effort("sync.record", async {
            self.store.write(memory?).await
        })
        .await;
    }
}

/// Stops the periodic sync when dropped or [`SyncHandle::stop`]ped.
#[derive(Debug)]
pub struct SyncHandle {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<(), SchedulerError>>>,
}

impl SyncHandle {
    /// Signals the loop and aborts any in-flight cycle.
    pub fn stop(mut self) {
        self.halt();
    }

    /// Returns `true` once the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.halt();
    }
}
