//! Escalation router.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agent_config::{DEFAULT_REQUEST_TIMEOUT_SECS, PolicyTable};
use agent_telemetry::best_effort_within;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info};

use crate::contracts::{EscalationEvent, EscalationSignal, TrustScore, Urgency};
use crate::decision::{EscalationDecision, EscalationOutcome};
use crate::integrations::{Notification, NotificationChannel};

/// Errors surfaced by escalation components.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A signal value fell outside its scale.
    #[error("invalid escalation signal: {0}")]
    InvalidSignal(&'static str),
    /// A channel failed to hand the notification over.
    #[error("delivery via `{channel}` failed: {reason}")]
    Delivery {
        /// Channel name.
        channel: String,
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
}

impl PolicyError {
    /// Convenience constructor for delivery failures.
    #[must_use]
    pub fn delivery(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Compares signals against the [`PolicyTable`] and fans qualifying events
/// out to every channel.
///
/// Stateless between calls: there is no dedup or cooldown, so a condition
/// that keeps qualifying keeps alerting.
#[derive(Clone)]
pub struct EscalationRouter {
    policy: PolicyTable,
    channels: Vec<Arc<dyn NotificationChannel>>,
    delivery_timeout: Duration,
}

impl fmt::Debug for EscalationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscalationRouter")
            .field("policy", &self.policy)
            .field(
                "channels",
                &self.channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("delivery_timeout", &self.delivery_timeout)
            .finish()
    }
}

impl EscalationRouter {
    /// Creates a router with no channels.
    #[must_use]
    pub fn new(policy: PolicyTable) -> Self {
        Self {
            policy,
            channels: Vec::new(),
            delivery_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Adds a delivery channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Bounds each channel delivery.
    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Returns the thresholds in force.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Judges a signal without delivering anything.
    #[must_use]
    pub fn evaluate(&self, signal: EscalationSignal) -> EscalationDecision {
        let qualifies = match signal {
            EscalationSignal::Urgency(urgency) => urgency.get() >= self.policy.action_item_urgency,
            EscalationSignal::TrustScore(score) => score.get() < self.policy.trust_alert_below,
        };
        if qualifies {
            EscalationDecision::Deliver
        } else {
            EscalationDecision::BelowThreshold
        }
    }

    /// Escalates an urgency signal.
    pub async fn escalate(
        &self,
        urgency: Urgency,
        message: &str,
        source: &str,
    ) -> EscalationOutcome {
        self.route(&EscalationEvent::urgency(urgency, message, source))
            .await
    }

    /// Escalates a composite trust score.
    pub async fn escalate_trust(
        &self,
        score: TrustScore,
        message: &str,
        source: &str,
    ) -> EscalationOutcome {
        self.route(&EscalationEvent::trust(score, message, source))
            .await
    }

    /// Delivers `event` to every channel if it qualifies.
    ///
    /// Channels are tried concurrently, once each. Failures and timeouts are
    /// logged and listed in the outcome.
    pub async fn route(&self, event: &EscalationEvent) -> EscalationOutcome {
        if !self.evaluate(event.signal()).is_deliver() {
            debug!(signal = %event.signal(), source = event.source(), "escalation below threshold");
            return EscalationOutcome::below_threshold();
        }

        let deliveries = self.channels.iter().map(|channel| async move {
            let notification = Notification::for_channel(event, channel.max_message_len());
            let sent = best_effort_within(
                "escalation.deliver",
                self.delivery_timeout,
                channel.deliver(&notification),
            )
            .await;
            (channel.name().to_owned(), sent.is_some())
        });

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (name, sent) in join_all(deliveries).await {
            if sent {
                delivered.push(name);
            } else {
                failed.push(name);
            }
        }

        info!(
            signal = %event.signal(),
            source = event.source(),
            delivered = delivered.len(),
            failed = failed.len(),
            "escalation routed"
        );
        EscalationOutcome::deliver(delivered, failed)
    }
}
