//! Phase machine walked by every sync cycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Where a sync cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No cycle in progress.
    Idle,
    /// Summarising the agent registry.
    SyncingAgents,
    /// Summarising recent traces.
    SyncingTraces,
    /// Writing the merged aggregate.
    SyncingAggregate,
}

impl SyncPhase {
    /// Returns `true` while a cycle is running.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::SyncingAgents => "syncing_agents",
            Self::SyncingTraces => "syncing_traces",
            Self::SyncingAggregate => "syncing_aggregate",
        };
        f.write_str(label)
    }
}

/// Events that move a cycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Timer tick or manual trigger.
    Start,
    /// Agent summary computed.
    AgentsSynced,
    /// Trace summary computed.
    TracesSynced,
    /// Aggregate written.
    AggregateWritten,
    /// A store read failed; the cycle is abandoned.
    Fail,
}

/// Errors emitted by the phase machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseError {
    /// Transition was not permitted from the current phase.
    #[error("invalid sync transition from {from} via {event:?}")]
    InvalidTransition {
        /// Phase prior to the attempted transition.
        from: SyncPhase,
        /// Event that triggered the failure.
        event: SyncEvent,
    },
}

/// One cycle's position in `Idle → SyncingAgents → SyncingTraces →
/// SyncingAggregate → Idle`.
///
/// Each cycle owns its own machine; concurrent cycles never share one.
#[derive(Debug, Clone, Copy)]
pub struct SyncCycle {
    phase: SyncPhase,
}

impl Default for SyncCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncCycle {
    /// Starts in [`SyncPhase::Idle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Applies an event, returning the resulting phase.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidTransition`] when the event is not allowed
    /// from the current phase.
    pub fn advance(&mut self, event: SyncEvent) -> Result<SyncPhase, PhaseError> {
        let next = match (self.phase, event) {
            (SyncPhase::Idle, SyncEvent::Start) => SyncPhase::SyncingAgents,
            (SyncPhase::SyncingAgents, SyncEvent::AgentsSynced) => SyncPhase::SyncingTraces,
            (SyncPhase::SyncingTraces, SyncEvent::TracesSynced) => SyncPhase::SyncingAggregate,
            (SyncPhase::SyncingAggregate, SyncEvent::AggregateWritten) => SyncPhase::Idle,
            (from, SyncEvent::Fail) if from.is_busy() => SyncPhase::Idle,
            (from, event) => return Err(PhaseError::InvalidTransition { from, event }),
        };

        debug!(from = %self.phase, to = %next, ?event, "sync phase transition");
        self.phase = next;
        Ok(next)
    }
}
