//! `OpenAI`-compatible embeddings endpoint.

use std::fmt;

use agent_config::EmbeddingSettings;
use agent_memory::{
    EmbeddingProvider, EmbeddingVector, MemoryError, MemoryResult, truncate_for_embedding,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::http_client::JsonClient;

const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Embedding provider calling `POST v1/embeddings`.
///
/// One HTTP call per [`EmbeddingProvider::embed`]; no retry.
pub struct OpenAiEmbeddings {
    client: JsonClient,
    model: String,
    dimensions: usize,
}

impl fmt::Debug for OpenAiEmbeddings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbeddings")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("endpoint", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbeddings {
    /// Constructs the provider.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or the
    /// base URL is invalid.
    pub fn new(settings: &EmbeddingSettings) -> AdapterResult<Self> {
        if settings.endpoint.api_key.is_none() {
            return Err(AdapterError::configuration(
                "embedding provider requires an API key",
            ));
        }
        if settings.dimensions == 0 {
            return Err(AdapterError::configuration(
                "embedding dimensions must be non-zero",
            ));
        }
        Ok(Self {
            client: JsonClient::new(&settings.endpoint)?,
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }

    fn build_request<'a>(&'a self, text: &'a str) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input: truncate_for_embedding(text),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector> {
        let request = self.build_request(text);
        let response: EmbeddingResponse = self
            .client
            .post_json(EMBEDDINGS_PATH, &request)
            .await
            .map_err(|err| MemoryError::embedding(err.to_string()))?;

        let vector = extract_embedding(response, self.dimensions)?;
        debug!(model = %self.model, chars = request.input.len(), "embedding generated");
        Ok(vector)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

fn extract_embedding(response: EmbeddingResponse, expected: usize) -> MemoryResult<EmbeddingVector> {
    let values = response
        .data
        .into_iter()
        .next()
        .map(|datum| datum.embedding)
        .ok_or_else(|| MemoryError::embedding("response contained no embedding"))?;
    if values.len() != expected {
        return Err(MemoryError::embedding(format!(
            "expected {expected} dimensions, got {}",
            values.len()
        )));
    }
    EmbeddingVector::new(values)
}
