//! Runtime pieces of the agent substrate.
//!
//! This crate wires the memory store, cache, trace recorder and escalation
//! router into the operations agents actually call: cache synchronisation on
//! a timer, agent-to-agent dispatch, and the capability request handlers.

#![warn(missing_docs, clippy::pedantic)]

pub mod dispatch;
pub mod handlers;
pub mod phase;
pub mod scheduler;
pub mod sync;

pub use dispatch::{
    DispatchClient, DispatchEnvelope, DispatchError, DispatchResult, HttpDispatchClient,
};
pub use handlers::{
    HandlerError, HandlerResponse, HandlerResult, SubstrateRequest, SubstrateService,
};
pub use phase::{PhaseError, SyncCycle, SyncEvent, SyncPhase};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskScheduler};
pub use sync::{
    AgentSummary, CacheOutcome, RestoredState, SYNC_TAG, SyncAggregate, SyncCoordinator,
    SyncError, SyncHandle, SyncResult, SyncStats, TraceSummary,
};
