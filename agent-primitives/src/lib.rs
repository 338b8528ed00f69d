//! Core shared types for the agent substrate.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;

/// Error type and result alias shared across the substrate.
pub use error::{Error, Result};
/// Identifier naming an agent in the fleet.
pub use ids::AgentId;
