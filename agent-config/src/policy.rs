//! The policy table shared by escalation and cache synchronisation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_URGENCY: u8 = 10;
const MAX_TRUST: u8 = 100;
/// Hard ceiling on the trace tail mirrored into the cache.
pub const MAX_TRACE_TAIL: usize = 50;

/// Errors raised while validating configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A policy value was outside its permitted range.
    #[error("invalid policy value: {0}")]
    InvalidPolicy(&'static str),
    /// An endpoint or channel setting was unusable.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// Result alias for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Named thresholds and time-to-live values.
///
/// One table is constructed at startup and shared by the escalation router and
/// the sync coordinator so no threshold is repeated at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    /// Urgency (1-10) at or above which an action item is escalated.
    pub action_item_urgency: u8,
    /// Trust score (0-100) strictly below which an alert is raised.
    pub trust_alert_below: u8,
    /// Cache TTL for the agent registry summary, in seconds.
    pub agents_ttl_secs: u64,
    /// Cache TTL for the trace summary, in seconds.
    pub traces_ttl_secs: u64,
    /// Cache TTL for the aggregate state, in seconds.
    pub aggregate_ttl_secs: u64,
    /// Number of recent registry records read per agent sync.
    pub agent_window: usize,
    /// Number of recent trace records read per sync.
    pub trace_window: usize,
    /// Maximum number of trace entries mirrored into the cache.
    pub trace_tail_cap: usize,
    /// Interval between timer-driven sync cycles, in seconds.
    pub sync_interval_secs: u64,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            action_item_urgency: 8,
            trust_alert_below: 80,
            agents_ttl_secs: 300,
            traces_ttl_secs: 600,
            aggregate_ttl_secs: 300,
            agent_window: 100,
            trace_window: 100,
            trace_tail_cap: MAX_TRACE_TAIL,
            sync_interval_secs: 300,
        }
    }
}

impl PolicyTable {
    /// Checks that every value is inside its permitted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPolicy`] naming the first offending value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.action_item_urgency == 0 || self.action_item_urgency > MAX_URGENCY {
            return Err(ConfigError::InvalidPolicy(
                "action item urgency must be within 1..=10",
            ));
        }
        if self.trust_alert_below > MAX_TRUST {
            return Err(ConfigError::InvalidPolicy(
                "trust alert threshold must be within 0..=100",
            ));
        }
        if self.agents_ttl_secs == 0 || self.traces_ttl_secs == 0 || self.aggregate_ttl_secs == 0 {
            return Err(ConfigError::InvalidPolicy("cache TTLs must be non-zero"));
        }
        if self.trace_tail_cap > MAX_TRACE_TAIL {
            return Err(ConfigError::InvalidPolicy("trace tail cap must be <= 50"));
        }
        if self.agent_window == 0 || self.trace_window == 0 {
            return Err(ConfigError::InvalidPolicy("read windows must be non-zero"));
        }
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::InvalidPolicy("sync interval must be non-zero"));
        }
        Ok(())
    }

    /// Cache TTL for the agent registry summary.
    #[must_use]
    pub const fn agents_ttl(&self) -> Duration {
        Duration::from_secs(self.agents_ttl_secs)
    }

    /// Cache TTL for the trace summary.
    #[must_use]
    pub const fn traces_ttl(&self) -> Duration {
        Duration::from_secs(self.traces_ttl_secs)
    }

    /// Cache TTL for the aggregate state.
    #[must_use]
    pub const fn aggregate_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregate_ttl_secs)
    }

    /// Interval between timer-driven sync cycles.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let table = PolicyTable::default();
        table.validate().unwrap();
        assert_eq!(table.action_item_urgency, 8);
        assert_eq!(table.trust_alert_below, 80);
        assert_eq!(table.agents_ttl(), Duration::from_secs(300));
        assert_eq!(table.traces_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let table = PolicyTable {
            action_item_urgency: 11,
            ..PolicyTable::default()
        };
        assert!(table.validate().is_err());

        let table = PolicyTable {
            trace_tail_cap: 51,
            ..PolicyTable::default()
        };
        assert!(table.validate().is_err());

        let table = PolicyTable {
            traces_ttl_secs: 0,
            ..PolicyTable::default()
        };
        assert!(table.validate().is_err());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let table: PolicyTable = serde_json::from_str(r#"{"action_item_urgency": 6}"#).unwrap();
        assert_eq!(table.action_item_urgency, 6);
        assert_eq!(table.trust_alert_below, 80);
    }

    #[test]
    fn agent_window_is_independent_of_trace_window() {
        let table: PolicyTable =
            serde_json::from_str(r#"{"agent_window": 25, "trace_window": 400}"#).unwrap();
        table.validate().unwrap();
        assert_eq!(table.agent_window, 25);
        assert_eq!(table.trace_window, 400);

        let table = PolicyTable {
            agent_window: 0,
            ..PolicyTable::default()
        };
        assert_eq!(
            table.validate(),
            Err(ConfigError::InvalidPolicy("read windows must be non-zero"))
        );
    }
}
