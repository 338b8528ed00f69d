//! Bounded spawning for the substrate's background work.
//!
//! Timer-driven sync cycles and anything else that outlives a single request
//! run here. Each task carries a static name so its start, finish and
//! cancellation show up in the logs.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const DEFAULT_MAX_CONCURRENCY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(31);

/// Limits applied by a [`TaskScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    max_concurrency: NonZeroUsize,
}

impl SchedulerConfig {
    /// Allows at most `max_concurrency` tasks to run at once.
    #[must_use]
    pub const fn new(max_concurrency: NonZeroUsize) -> Self {
        Self { max_concurrency }
    }

    /// Concurrency ceiling.
    #[must_use]
    pub const fn max_concurrency(self) -> NonZeroUsize {
        self.max_concurrency
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

/// Errors produced by the scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler was closed before the task could run.
    #[error("scheduler closed")]
    Closed,
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Cloneable handle spawning named tasks onto the tokio runtime.
///
/// Clones share one permit pool, so the ceiling holds across all of them.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    permits: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: SchedulerConfig,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl TaskScheduler {
    /// Creates a scheduler with its own permit pool.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency().get())),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns the limits in force.
    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Number of tasks currently holding a permit.
    #[must_use]
    pub fn running(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.config
            .max_concurrency()
            .get()
            .saturating_sub(self.permits.available_permits())
    }

    /// Returns `true` once [`TaskScheduler::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuses new tasks and cancels those still waiting for a permit.
    /// Tasks already running are left to finish.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.permits.close();
            info!("task scheduler closed");
        }
    }

    /// Runs `future` as task `name` once a permit is free.
    ///
    /// The handle resolves to [`SchedulerError::Closed`] if the scheduler
    /// closes while the task is still queued; the future is then dropped
    /// without being polled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Closed`] when the scheduler is already closed.
    pub fn spawn<F, T>(
        &self,
        name: &'static str,
        future: F,
    ) -> SchedulerResult<JoinHandle<SchedulerResult<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(SchedulerError::Closed);
        }

        let permits = Arc::clone(&self.permits);
        Ok(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                debug!(task = name, "queued task cancelled by close");
                return Err(SchedulerError::Closed);
            };
            debug!(task = name, "task started");
            let output = future.await;
            debug!(task = name, "task finished");
            Ok(output)
        }))
    }
}
