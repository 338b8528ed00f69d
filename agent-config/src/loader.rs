//! Configuration loaders.

use std::env;

use anyhow::Context;
use tracing::debug;

use crate::settings::{DispatchSettings, EmbeddingSettings, EndpointSettings, SubstrateConfig};

/// Memory store base URL.
pub const STORE_URL_ENV: &str = "SUBSTRATE_STORE_URL";
/// Memory store credential.
pub const STORE_KEY_ENV: &str = "SUBSTRATE_STORE_KEY";
/// Cache base URL.
pub const CACHE_URL_ENV: &str = "SUBSTRATE_CACHE_URL";
/// Cache credential.
pub const CACHE_TOKEN_ENV: &str = "SUBSTRATE_CACHE_TOKEN";
/// Embedding provider base URL.
pub const EMBEDDINGS_URL_ENV: &str = "SUBSTRATE_EMBEDDINGS_URL";
/// Embedding provider credential.
pub const EMBEDDINGS_KEY_ENV: &str = "SUBSTRATE_EMBEDDINGS_KEY";
/// Embedding model override.
pub const EMBEDDINGS_MODEL_ENV: &str = "SUBSTRATE_EMBEDDINGS_MODEL";
/// Agent dispatch base URL.
pub const DISPATCH_URL_ENV: &str = "SUBSTRATE_DISPATCH_URL";

impl SubstrateConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Fails when the document is malformed or a value is out of range.
    pub fn from_json_str(document: &str) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_str(document).context("failed to parse substrate configuration")?;
        config
            .validate()
            .context("substrate configuration failed validation")?;
        Ok(config)
    }

    /// Builds configuration from the process environment.
    ///
    /// Notification channels and policy overrides are not expressible through
    /// single variables; start from [`SubstrateConfig::from_json_str`] for those.
    ///
    /// # Errors
    ///
    /// Fails when a supplied value does not validate.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Fails when a supplied value does not validate.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = |url_key: &str, key_key: &str| {
            lookup(url_key).map(|url| {
                let settings = EndpointSettings::new(url);
                match lookup(key_key) {
                    Some(key) => settings.with_api_key(key),
                    None => settings,
                }
            })
        };

        let store = endpoint(STORE_URL_ENV, STORE_KEY_ENV);
        let cache = endpoint(CACHE_URL_ENV, CACHE_TOKEN_ENV);
        let embeddings = endpoint(EMBEDDINGS_URL_ENV, EMBEDDINGS_KEY_ENV).map(|endpoint| {
            let mut settings = EmbeddingSettings::new(endpoint);
            if let Some(model) = lookup(EMBEDDINGS_MODEL_ENV) {
                settings.model = model;
            }
            settings
        });
        let dispatch = lookup(DISPATCH_URL_ENV).map(|url| DispatchSettings {
            endpoint: EndpointSettings::new(url),
        });

        let config = Self {
            store,
            cache,
            embeddings,
            dispatch,
            ..Self::default()
        };
        config
            .validate()
            .context("environment configuration failed validation")?;

        debug!(
            store = config.store.is_some(),
            cache = config.cache.is_some(),
            embeddings = config.embeddings.is_some(),
            dispatch = config.dispatch.is_some(),
            "loaded substrate configuration from environment"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn lookup_populates_configured_services() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (STORE_URL_ENV, "https://store.example"),
            (STORE_KEY_ENV, "service-key"),
            (EMBEDDINGS_URL_ENV, "https://embed.example"),
            (EMBEDDINGS_MODEL_ENV, "text-embedding-3-large"),
        ]);
        let config =
            SubstrateConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned())).unwrap();

        let store = config.store.unwrap();
        assert_eq!(store.base_url, "https://store.example");
        assert_eq!(store.api_key.as_deref(), Some("service-key"));
        assert!(config.cache.is_none());
        let embeddings = config.embeddings.unwrap();
        assert_eq!(embeddings.model, "text-embedding-3-large");
        assert_eq!(embeddings.dimensions, 1536);
    }

    #[test]
    fn json_document_round_trips_policy() {
        let config = SubstrateConfig::from_json_str(
            r#"{
                "cache": {"base_url": "https://cache.example", "api_key": "t"},
                "channels": [
                    {"name": "ops", "kind": "webhook", "base_url": "https://ops.example"}
                ],
                "policy": {"trust_alert_below": 70}
            }"#,
        )
        .unwrap();
        assert_eq!(config.policy.trust_alert_below, 70);
        assert_eq!(config.policy.action_item_urgency, 8);
        assert_eq!(config.channels[0].message_cap(), 1500);
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let err = SubstrateConfig::from_json_str(r#"{"policy": {"action_item_urgency": 0}}"#)
            .expect_err("urgency 0 is invalid");
        assert!(err.to_string().contains("validation"));
    }
}
