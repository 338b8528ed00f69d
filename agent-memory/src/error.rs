//! Error types for the memory subsystem.

use serde_json::Error as SerdeError;
use thiserror::Error;
use uuid::Uuid;

/// Errors emitted by memory components.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The underlying store rejected the operation or could not be reached.
    #[error("memory store error: {reason}")]
    Persistence {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// No record exists for the requested identifier.
    #[error("memory record {0} not found")]
    NotFound(Uuid),
    /// Memory record data failed validation.
    #[error("invalid memory record: {0}")]
    InvalidRecord(&'static str),
    /// The embedding provider failed to produce a vector.
    #[error("embedding error: {reason}")]
    Embedding {
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
}

impl MemoryError {
    /// Helper to construct persistence errors from string-like values.
    #[must_use]
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }

    /// Helper to construct embedding errors from string-like values.
    #[must_use]
    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::Embedding {
            reason: reason.into(),
        }
    }
}

/// Result type alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
