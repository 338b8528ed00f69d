//! Escalation policy for substrate agents.
//!
//! Agents compute an urgency or trust signal locally and hand it to the
//! [`EscalationRouter`], which compares it against the shared
//! [`agent_config::PolicyTable`] and forwards qualifying events to every
//! configured [`NotificationChannel`].

#![warn(missing_docs, clippy::pedantic)]

pub mod contracts;
pub mod decision;
pub mod engine;
pub mod integrations;

pub use contracts::{EscalationEvent, EscalationSignal, TrustScore, Urgency};
pub use decision::{EscalationDecision, EscalationOutcome};
pub use engine::{EscalationRouter, PolicyError, PolicyResult};
pub use integrations::{Notification, NotificationChannel, truncate_message};
