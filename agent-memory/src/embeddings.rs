//! Embedding vectors and the provider interface that produces them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{MemoryError, MemoryResult};

/// Longest input, in characters, submitted to an embedding provider.
pub const MAX_EMBEDDING_INPUT_CHARS: usize = 8000;

/// Wrapper type around an immutable floating-point embedding.
#[derive(Clone, PartialEq)]
pub struct EmbeddingVector {
    values: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Creates a new embedding from owned values.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the supplied vector is empty
    /// or contains non-finite values.
    pub fn new(values: Vec<f32>) -> MemoryResult<Self> {
        if values.is_empty() {
            return Err(MemoryError::InvalidRecord(
                "embedding vector must not be empty",
            ));
        }
        if !values.iter().all(|value| value.is_finite()) {
            return Err(MemoryError::InvalidRecord(
                "embedding vector contains non-finite values",
            ));
        }
        Ok(Self {
            values: Arc::<[f32]>::from(values.into_boxed_slice()),
        })
    }

    /// Returns an immutable view of the embedding data.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Returns the dimensionality of the embedding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`; [`EmbeddingVector::new`] rejects empty inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cosine similarity in `[-1, 1]`.
    ///
    /// Vectors of different dimensionality, or with zero magnitude, score `0.0`.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.len() != other.len() {
            return 0.0;
        }
        let denominator = self.magnitude() * other.magnitude();
        if denominator == 0.0 {
            0.0
        } else {
            self.dot(other) / denominator
        }
    }

    fn dot(&self, other: &Self) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    fn magnitude(&self) -> f32 {
        self.values
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt()
    }
}

impl std::fmt::Debug for EmbeddingVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingVector")
            .field("dimensions", &self.len())
            .finish()
    }
}

impl Serialize for EmbeddingVector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.values.as_ref().serialize(serializer)
    }
}

/// Vector columns come back either as JSON arrays or as pgvector text (`"[0.1,0.2]"`).
#[derive(Deserialize)]
#[serde(untagged)]
enum VectorRepr {
    Values(Vec<f32>),
    Text(String),
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = match VectorRepr::deserialize(deserializer)? {
            VectorRepr::Values(values) => values,
            VectorRepr::Text(text) => serde_json::from_str::<Vec<f32>>(&text)
                .map_err(serde::de::Error::custom)?,
        };
        Self::new(values).map_err(serde::de::Error::custom)
    }
}

/// Turns text into a fixed-length vector.
///
/// One call is one unit of work: implementations do not retry.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Dimensionality of the vectors this provider returns.
    fn dimensions(&self) -> usize;

    /// Embeds `text`, truncated to [`MAX_EMBEDDING_INPUT_CHARS`].
    async fn embed(&self, text: &str) -> MemoryResult<EmbeddingVector>;
}

/// Returns the longest prefix of `text` that fits the provider input limit.
#[must_use]
pub fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBEDDING_INPUT_CHARS) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vectors() {
        let err = EmbeddingVector::new(vec![]).expect_err("empty vector should error");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = EmbeddingVector::new(vec![1.0, f32::NAN]).expect_err("nan not allowed");
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[test]
    fn accepts_pgvector_text() {
        let decoded: EmbeddingVector = serde_json::from_str("\"[0.5,0.25]\"").unwrap();
        assert_eq!(decoded.as_slice(), &[0.5, 0.25]);
        let decoded: EmbeddingVector = serde_json::from_str("[1.0]").unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn cosine_handles_mismatched_dimensions() {
        let a = EmbeddingVector::new(vec![1.0, 0.0]).unwrap();
        let b = EmbeddingVector::new(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(a.cosine_similarity(&b).abs() < f32::EPSILON);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let short = "hello";
        assert_eq!(truncate_for_embedding(short), short);

        let long: String = "é".repeat(MAX_EMBEDDING_INPUT_CHARS + 10);
        let truncated = truncate_for_embedding(&long);
        assert_eq!(truncated.chars().count(), MAX_EMBEDDING_INPUT_CHARS);
    }
}
