//! Cache layer speaking Redis commands over HTTP.

use std::fmt;
use std::time::Duration;

use agent_config::EndpointSettings;
use agent_memory::{CacheError, CacheKey, CacheLayer, CacheResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::AdapterResult;
use crate::http_client::JsonClient;

const PIPELINE_PATH: &str = "pipeline";

/// [`CacheLayer`] over a REST Redis gateway.
///
/// `set` sends `SET` and `EXPIRE` as one pipeline; `get` sends `GET`. Values
/// are stored as JSON-encoded strings.
#[derive(Clone)]
pub struct RestCache {
    client: JsonClient,
}

impl fmt::Debug for RestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestCache")
            .field("endpoint", &self.client.base_url())
            .finish()
    }
}

impl RestCache {
    /// Connects to the gateway; the key in `settings` is the bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`](crate::AdapterError::Configuration)
    /// for an invalid URL or token.
    pub fn new(settings: &EndpointSettings) -> AdapterResult<Self> {
        Ok(Self {
            client: JsonClient::new(settings)?,
        })
    }
}

#[async_trait]
impl CacheLayer for RestCache {
    async fn set(&self, key: CacheKey, value: &Value, ttl: Duration) -> CacheResult<()> {
        let commands = set_commands(key, value, ttl)?;
        let replies: Vec<CommandReply> = self.client.post_json(PIPELINE_PATH, &commands).await?;
        for reply in replies {
            reply.into_result()?;
        }
        debug!(%key, ttl_secs = ttl.as_secs(), "cache key written");
        Ok(())
    }

    async fn get(&self, key: CacheKey) -> CacheResult<Option<Value>> {
        let reply: CommandReply = self
            .client
            .post_json("", &json!(["GET", key.as_str()]))
            .await?;
        decode_cached(reply.into_result()?)
    }
}

/// One entry of the gateway's answer: `{"result": ..}` or `{"error": ".."}`.
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl CommandReply {
    fn into_result(self) -> CacheResult<Value> {
        match self.error {
            Some(error) => Err(CacheError::transport(error)),
            None => Ok(self.result),
        }
    }
}

fn set_commands(key: CacheKey, value: &Value, ttl: Duration) -> CacheResult<Value> {
    let payload = serde_json::to_string(value)?;
    Ok(json!([
        ["SET", key.as_str(), payload],
        ["EXPIRE", key.as_str(), ttl.as_secs()],
    ]))
}

/// `null` is a miss; anything else must be a JSON-encoded string.
fn decode_cached(result: Value) -> CacheResult<Option<Value>> {
    match result {
        Value::Null => Ok(None),
        Value::String(payload) => Ok(Some(serde_json::from_str(&payload)?)),
        other => Err(CacheError::transport(format!(
            "unexpected GET result: {other}"
        ))),
    }
}
