//! Escalation signals and the events that carry them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{PolicyError, PolicyResult};

/// Urgency on a 1..=10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Urgency(u8);

impl Urgency {
    /// Lowest accepted urgency.
    pub const MIN: u8 = 1;
    /// Highest accepted urgency.
    pub const MAX: u8 = 10;

    /// Validates and wraps an urgency value.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSignal`] outside `1..=10`.
    pub fn new(value: u8) -> PolicyResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PolicyError::InvalidSignal("urgency must be within 1..=10"))
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Urgency {
    type Error = PolicyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Urgency> for u8 {
    fn from(value: Urgency) -> Self {
        value.0
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

/// Composite 0..=100 health metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TrustScore(u8);

impl TrustScore {
    /// Highest possible score.
    pub const MAX: u8 = 100;

    /// Validates and wraps a score.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidSignal`] above 100.
    pub fn new(value: u8) -> PolicyResult<Self> {
        if value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(PolicyError::InvalidSignal("trust score must be within 0..=100"))
        }
    }

    /// Percentage of passing checks, rounded down. No checks scores zero.
    #[must_use]
    pub fn from_checks<I>(checks: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let (passed, total) = checks
            .into_iter()
            .fold((0_usize, 0_usize), |(passed, total), ok| {
                (passed + usize::from(ok), total + 1)
            });
        if total == 0 {
            return Self(0);
        }
        let percent = passed * usize::from(Self::MAX) / total;
        Self(u8::try_from(percent).unwrap_or(Self::MAX))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for TrustScore {
    type Error = PolicyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrustScore> for u8 {
    fn from(value: TrustScore) -> Self {
        value.0
    }
}

impl fmt::Display for TrustScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/100", self.0)
    }
}

/// The measured quantity an escalation is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSignal {
    /// Qualifies at or above the action-item threshold.
    Urgency(Urgency),
    /// Qualifies strictly below the trust alert threshold.
    TrustScore(TrustScore),
}

impl fmt::Display for EscalationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Urgency(urgency) => write!(f, "urgency {urgency}"),
            Self::TrustScore(score) => write!(f, "trust score {score}"),
        }
    }
}

/// Transient trigger; never persisted by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    signal: EscalationSignal,
    message: String,
    source: String,
    timestamp: DateTime<Utc>,
}

impl EscalationEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        signal: EscalationSignal,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            signal,
            message: message.into(),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for an urgency event.
    #[must_use]
    pub fn urgency(urgency: Urgency, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(EscalationSignal::Urgency(urgency), message, source)
    }

    /// Shorthand for a trust score event.
    #[must_use]
    pub fn trust(score: TrustScore, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(EscalationSignal::TrustScore(score), message, source)
    }

    /// Returns the signal.
    #[must_use]
    pub fn signal(&self) -> EscalationSignal {
        self.signal
    }

    /// Returns the untruncated message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns who raised the event.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns when the event was raised.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
