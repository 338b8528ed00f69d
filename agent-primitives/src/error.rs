//! Shared error definitions for agent primitives.

use thiserror::Error;

/// Result alias used throughout the substrate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Agent identifier failed validation.
    #[error("invalid agent id `{id}`: {reason}")]
    InvalidAgentId {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
