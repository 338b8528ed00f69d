//! Seam to human notification channels.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::contracts::{EscalationEvent, EscalationSignal};
use crate::engine::PolicyResult;

/// Message handed to a channel, already cut to the channel's cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Signal that triggered the escalation.
    pub signal: EscalationSignal,
    /// Truncated message text.
    pub message: String,
    /// Who raised the event.
    pub source: String,
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Builds the notification for one channel.
    #[must_use]
    pub fn for_channel(event: &EscalationEvent, max_message_len: usize) -> Self {
        Self {
            signal: event.signal(),
            message: truncate_message(event.message(), max_message_len).to_owned(),
            source: event.source().to_owned(),
            timestamp: event.timestamp(),
        }
    }
}

/// Cuts `message` to at most `max_chars` characters.
#[must_use]
pub fn truncate_message(message: &str, max_chars: usize) -> &str {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

/// Transport to a human.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Longest message, in characters, the channel accepts.
    fn max_message_len(&self) -> usize;

    /// Sends one notification. Called at most once per escalation.
    async fn deliver(&self, notification: &Notification) -> PolicyResult<()>;
}
