//! Router decisions and delivery outcomes.

use serde::{Deserialize, Serialize};

/// Whether an event qualifies for human notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationDecision {
    /// The signal crossed its threshold.
    Deliver,
    /// The signal stayed on the quiet side of its threshold.
    BelowThreshold,
}

impl EscalationDecision {
    /// Returns true for [`EscalationDecision::Deliver`].
    #[must_use]
    pub fn is_deliver(self) -> bool {
        self == Self::Deliver
    }
}

/// What happened to one escalation.
///
/// Delivery failures are reported here and in the logs, never as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    decision: EscalationDecision,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    delivered: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
}

impl EscalationOutcome {
    /// Outcome for an event that did not qualify.
    #[must_use]
    pub fn below_threshold() -> Self {
        Self {
            decision: EscalationDecision::BelowThreshold,
            delivered: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub(crate) fn deliver(delivered: Vec<String>, failed: Vec<String>) -> Self {
        Self {
            decision: EscalationDecision::Deliver,
            delivered,
            failed,
        }
    }

    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> EscalationDecision {
        self.decision
    }

    /// Channels that accepted the notification.
    #[must_use]
    pub fn delivered(&self) -> &[String] {
        &self.delivered
    }

    /// Channels whose delivery failed or timed out.
    #[must_use]
    pub fn failed(&self) -> &[String] {
        &self.failed
    }
}
