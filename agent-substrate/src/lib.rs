//! Shared substrate for a fleet of narrow agents.
//!
//! Depend on this crate via `cargo add agent-substrate`. It bundles the
//! workspace crates behind feature flags: a durable memory store, a
//! best-effort cache mirror kept in step by the sync coordinator, provenance
//! traces, threshold-based escalation to humans, and agent-to-agent dispatch.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Sync coordinator, dispatch, and capability handlers (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// HTTP-backed store, cache, embeddings, and channels (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use agent_adapters as adapters;

/// Memory records, store and cache contracts (enabled by `memory` feature).
#[cfg(feature = "memory")]
pub use agent_memory as memory;

/// Escalation routing (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use agent_policy as policy;

/// Traces, best-effort execution, and logging (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Process configuration and the policy table (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;
