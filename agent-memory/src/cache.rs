//! Best-effort cache mirror of summarised store state.
//!
//! The cache is never authoritative: a miss means "re-derive from the memory
//! store", never "false" or "empty".

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// The fixed cache key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Agent registry summary.
    Agents,
    /// Recent trace summary and tail.
    Traces,
    /// Aggregate state produced by a full sync.
    State,
}

impl CacheKey {
    /// Every key, in restore order.
    pub const ALL: [Self; 3] = [Self::State, Self::Agents, Self::Traces];

    /// Wire name of the key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agents => "substrate:agents",
            Self::Traces => "substrate:traces",
            Self::State => "substrate:state",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("cache transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },
    /// A stored payload could not be decoded.
    #[error("cache payload error: {source}")]
    Payload {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value mirror with per-key TTL.
///
/// Callers treat every error as a failure indicator; nothing in the substrate
/// lets a cache error reach a primary result.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: CacheKey, value: &Value, ttl: Duration) -> CacheResult<()>;

    /// Reads `key`; `Ok(None)` is a miss.
    async fn get(&self, key: CacheKey) -> CacheResult<Option<Value>>;
}

struct CachedValue {
    payload: String,
    expires_at: Instant,
}

/// Process-local cache honouring TTLs on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, CachedValue>>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache").finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheLayer for InMemoryCache {
    async fn set(&self, key: CacheKey, value: &Value, ttl: Duration) -> CacheResult<()> {
        let payload = serde_json::to_string(value)?;
        self.entries.write().await.insert(
            key,
            CachedValue {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: CacheKey) -> CacheResult<Option<Value>> {
        let guard = self.entries.read().await;
        match guard.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                Ok(Some(serde_json::from_str(&entry.payload)?))
            }
            _ => Ok(None),
        }
    }
}
