//! The single wrapper every secondary operation runs through.
//!
//! Trace persistence, cache writes and escalation delivery must never change
//! the outcome of the operation they accompany. Running them through
//! [`best_effort`] turns their failure into a `warn` log and a `None`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

/// Awaits `future`, logging and discarding any error.
pub async fn best_effort<F, T, E>(operation: &'static str, future: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match future.await {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(operation, error = %err, "best-effort operation failed");
            None
        }
    }
}

/// Like [`best_effort`], additionally giving up after `limit`.
///
/// The abandoned future is dropped; no cancellation reaches the remote side.
pub async fn best_effort_within<F, T, E>(
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match timeout(limit, future).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(operation, error = %err, "best-effort operation failed");
            None
        }
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis(), "best-effort operation timed out");
            None
        }
    }
}
