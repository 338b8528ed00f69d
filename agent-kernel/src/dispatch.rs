//! Synchronous agent-to-agent hand-off.

use std::fmt;

use agent_adapters::{AdapterError, JsonClient};
use agent_config::DispatchSettings;
use agent_primitives::AgentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by dispatch clients. Every variant is a hard failure for
/// the caller; nothing is retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The target could not be reached or did not answer in time.
    #[error("dispatch transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },
    /// The target answered with a non-success status.
    #[error("agent answered {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },
    /// The target answered with something other than JSON.
    #[error("undecodable agent response: {reason}")]
    Decode {
        /// Additional context about the error.
        reason: String,
    },
}

impl From<AdapterError> for DispatchError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Status { status, body } => Self::Upstream { status, body },
            AdapterError::Response { reason } => Self::Decode { reason },
            other => Self::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Body posted to the target agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    /// What the caller wants done.
    pub intent: String,
    /// Intent-specific payload.
    pub request: Value,
}

/// Invokes another agent and returns its JSON answer unchanged.
#[async_trait]
pub trait DispatchClient: Send + Sync {
    /// Sends `{intent, request}` to `target`.
    async fn dispatch(&self, target: &AgentId, intent: &str, request: Value) -> DispatchResult<Value>;
}

/// Posts to `<base_url>/<agent id>`.
#[derive(Clone)]
pub struct HttpDispatchClient {
    client: JsonClient,
}

impl fmt::Debug for HttpDispatchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDispatchClient")
            .field("base_url", &self.client.base_url())
            .finish()
    }
}

impl HttpDispatchClient {
    /// Builds a client from dispatch settings.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for an invalid base URL.
    pub fn new(settings: &DispatchSettings) -> Result<Self, AdapterError> {
        Ok(Self {
            client: JsonClient::new(&settings.endpoint)?,
        })
    }
}

#[async_trait]
impl DispatchClient for HttpDispatchClient {
    async fn dispatch(&self, target: &AgentId, intent: &str, request: Value) -> DispatchResult<Value> {
        let envelope = DispatchEnvelope {
            intent: intent.to_owned(),
            request,
        };
        debug!(%target, intent, "dispatching to agent");
        Ok(self.client.post_json(target.as_str(), &envelope).await?)
    }
}

#[cfg(test)]
mod tests {
    use agent_config::EndpointSettings;
    use serde_json::json;

    use super::*;

    #[test]
    fn status_errors_become_upstream() {
        let err = DispatchError::from(AdapterError::Status {
            status: 502,
            body: "bad gateway".into(),
        });
        assert!(matches!(err, DispatchError::Upstream { status: 502, .. }));
    }

    #[test]
    fn timeouts_are_transport_errors() {
        let err = DispatchError::from(AdapterError::transport("POST timed out"));
        assert!(matches!(err, DispatchError::Transport { .. }));
    }

    #[test]
    fn envelope_shape() {
        let envelope = DispatchEnvelope {
            intent: "summarize".into(),
            request: json!({"text": "hello"}),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"intent": "summarize", "request": {"text": "hello"}})
        );
    }

    #[test]
    fn target_path_is_agent_id() {
        let settings = DispatchSettings {
            endpoint: EndpointSettings::new("https://agents.example.com/api"),
        };
        let client = HttpDispatchClient::new(&settings).unwrap();
        let target: AgentId = "voice-proxy".parse().unwrap();
        let uri = client.client.endpoint(target.as_str(), &[]).unwrap();
        assert_eq!(uri.to_string(), "https://agents.example.com/api/voice-proxy");
    }
}
