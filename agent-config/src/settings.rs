//! Strongly typed configuration schema.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{ConfigError, ConfigResult, PolicyTable};

/// Timeout applied to external calls unless an endpoint overrides it.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

const DIRECT_MESSAGE_CAP: usize = 160;
const WEBHOOK_CAP: usize = 1500;

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Base URL, credential and timeout for one external service.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// Base URL, including scheme.
    pub base_url: String,
    /// Optional bearer credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointSettings {
    /// Creates settings for the given base URL with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Supplies a credential.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, field: &'static str) -> ConfigResult<()> {
        validate_url(field, &self.base_url)?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field,
                reason: "timeout must be non-zero".into(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_owned()
}

fn default_dimensions() -> usize {
    1536
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Provider endpoint.
    #[serde(flatten)]
    pub endpoint: EndpointSettings,
    /// Model identifier sent with every request.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Expected vector length.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl EmbeddingSettings {
    /// Creates settings for the endpoint using the default model and dimensions.
    #[must_use]
    pub fn new(endpoint: EndpointSettings) -> Self {
        Self {
            endpoint,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Settings for synchronous agent-to-agent dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Base endpoint; the target agent id is appended as a path segment.
    #[serde(flatten)]
    pub endpoint: EndpointSettings,
}

/// Wire shape of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// `POST {to, message}` direct delivery (SMS-like, short cap).
    DirectMessage,
    /// `POST {urgency, message, source}` generic escalation endpoint.
    Webhook,
}

impl ChannelKind {
    /// Message length cap applied when a channel does not set its own.
    #[must_use]
    pub const fn default_message_cap(self) -> usize {
        match self {
            Self::DirectMessage => DIRECT_MESSAGE_CAP,
            Self::Webhook => WEBHOOK_CAP,
        }
    }
}

/// One human notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Label used in logs.
    pub name: String,
    /// Wire shape.
    pub kind: ChannelKind,
    /// Endpoint receiving notifications.
    #[serde(flatten)]
    pub endpoint: EndpointSettings,
    /// Recipient address for direct-message channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Overrides the kind's default message cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_len: Option<usize>,
}

impl ChannelSettings {
    /// Effective message length cap, in characters.
    #[must_use]
    pub fn message_cap(&self) -> usize {
        self.max_message_len
            .unwrap_or_else(|| self.kind.default_message_cap())
    }

    fn validate(&self) -> ConfigResult<()> {
        self.endpoint.validate("channels.base_url")?;
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "channels.name",
                reason: "channel name must not be empty".into(),
            });
        }
        if self.message_cap() == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "channels.max_message_len",
                reason: "message cap must be non-zero".into(),
            });
        }
        if self.kind == ChannelKind::DirectMessage && self.recipient.is_none() {
            return Err(ConfigError::InvalidSetting {
                field: "channels.recipient",
                reason: format!("direct-message channel `{}` needs a recipient", self.name),
            });
        }
        Ok(())
    }
}

/// Complete process-level configuration.
///
/// Services left unset are expected to be supplied in-process (tests and
/// single-process hosts use the in-memory store and cache).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// Durable memory store.
    pub store: Option<EndpointSettings>,
    /// Cache mirror.
    pub cache: Option<EndpointSettings>,
    /// Embedding provider.
    pub embeddings: Option<EmbeddingSettings>,
    /// Agent dispatch.
    pub dispatch: Option<DispatchSettings>,
    /// Human notification channels.
    pub channels: Vec<ChannelSettings>,
    /// Shared thresholds and TTLs.
    pub policy: PolicyTable,
}

impl SubstrateConfig {
    /// Validates every configured section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered.
    pub fn validate(&self) -> ConfigResult<()> {
        self.policy.validate()?;
        if let Some(store) = &self.store {
            store.validate("store.base_url")?;
        }
        if let Some(cache) = &self.cache {
            cache.validate("cache.base_url")?;
        }
        if let Some(embeddings) = &self.embeddings {
            embeddings.endpoint.validate("embeddings.base_url")?;
            if embeddings.dimensions == 0 {
                return Err(ConfigError::InvalidSetting {
                    field: "embeddings.dimensions",
                    reason: "dimensions must be non-zero".into(),
                });
            }
        }
        if let Some(dispatch) = &self.dispatch {
            dispatch.endpoint.validate("dispatch.base_url")?;
        }
        for channel in &self.channels {
            channel.validate()?;
        }
        Ok(())
    }
}

fn validate_url(field: &'static str, url: &str) -> ConfigResult<()> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            field,
            reason: format!("`{url}` must start with http:// or https://"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_caps_follow_kind() {
        let channel: ChannelSettings = serde_json::from_str(
            r#"{"name":"sms","kind":"direct_message","base_url":"https://sms.example","recipient":"+15550100"}"#,
        )
        .unwrap();
        assert_eq!(channel.message_cap(), 160);
        assert_eq!(channel.endpoint.timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

        let channel: ChannelSettings = serde_json::from_str(
            r#"{"name":"ops","kind":"webhook","base_url":"https://ops.example","max_message_len":900}"#,
        )
        .unwrap();
        assert_eq!(channel.message_cap(), 900);
    }

    #[test]
    fn direct_message_requires_recipient() {
        let config = SubstrateConfig {
            channels: vec![ChannelSettings {
                name: "sms".into(),
                kind: ChannelKind::DirectMessage,
                endpoint: EndpointSettings::new("https://sms.example"),
                recipient: None,
                max_message_len: None,
            }],
            ..SubstrateConfig::default()
        };
        let err = config.validate().expect_err("recipient required");
        assert!(matches!(err, ConfigError::InvalidSetting { field: "channels.recipient", .. }));
    }

    #[test]
    fn debug_redacts_credentials() {
        let settings = EndpointSettings::new("https://store.example").with_api_key("secret");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn rejects_schemeless_urls() {
        let config = SubstrateConfig {
            store: Some(EndpointSettings::new("store.example")),
            ..SubstrateConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
