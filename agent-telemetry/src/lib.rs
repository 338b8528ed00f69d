//! Observability utilities for substrate agents.

#![warn(missing_docs, clippy::pedantic)]

pub mod best_effort;
pub mod subscriber;
pub mod trace;

pub use best_effort::{best_effort, best_effort_within};
pub use subscriber::init_subscriber;
pub use trace::{TraceEntry, TraceNotation, TraceRecorder, DEFAULT_RESULT};
