//! Shared record types for the memory subsystem.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::embeddings::EmbeddingVector;
use crate::{MemoryError, MemoryResult};

/// Lowest stored importance.
pub const MIN_IMPORTANCE: u8 = 1;
/// Highest stored importance.
pub const MAX_IMPORTANCE: u8 = 10;
const DEFAULT_IMPORTANCE: u8 = 5;

/// Tag marking agent registry entries.
pub const AGENT_REGISTRY_TAG: &str = "agent_registry";
/// Tag marking persisted trace entries.
pub const TRACE_TAG: &str = "trace";

/// Kind of memory a record holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MemoryType {
    /// Internal substrate or agent bookkeeping.
    System,
    /// Facts captured from, or about, the human user.
    User,
    /// Domain label chosen by an agent.
    Custom(String),
}

impl MemoryType {
    /// Creates a [`MemoryType::Custom`] value after validating the provided name.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the supplied label is empty.
    pub fn custom(label: impl Into<String>) -> MemoryResult<Self> {
        let value = label.into();
        if value.trim().is_empty() {
            return Err(MemoryError::InvalidRecord(
                "custom memory type label must not be empty",
            ));
        }
        Ok(Self::Custom(value))
    }

    /// Returns the wire label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Custom(label) => label,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = MemoryError;

    fn from_str(s: &str) -> MemoryResult<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            other => Self::custom(other),
        }
    }
}

impl TryFrom<String> for MemoryType {
    type Error = MemoryError;

    fn try_from(value: String) -> MemoryResult<Self> {
        value.parse()
    }
}

impl From<MemoryType> for String {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::Custom(label) => label,
            other => other.as_str().to_owned(),
        }
    }
}

/// Clamps an arbitrary importance into `[MIN_IMPORTANCE, MAX_IMPORTANCE]`.
#[must_use]
pub fn clamp_importance(value: i64) -> u8 {
    let clamped = value.clamp(i64::from(MIN_IMPORTANCE), i64::from(MAX_IMPORTANCE));
    u8::try_from(clamped).unwrap_or(MAX_IMPORTANCE)
}

/// A stored memory. Only the embedding may change after the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    id: Uuid,
    content: String,
    memory_type: MemoryType,
    #[serde(default)]
    categories: BTreeSet<String>,
    importance: u8,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    source: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<EmbeddingVector>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Returns the unique identifier for this record.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the text content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the memory type.
    #[must_use]
    pub fn memory_type(&self) -> &MemoryType {
        &self.memory_type
    }

    /// Returns the categories.
    #[must_use]
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Returns the clamped importance.
    #[must_use]
    pub fn importance(&self) -> u8 {
        self.importance
    }

    /// Returns whether the record was written by the substrate itself.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns the free-form provenance string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns associated tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns `true` when the record carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns the optional embedding associated with the record.
    #[must_use]
    pub fn embedding(&self) -> Option<&EmbeddingVector> {
        self.embedding.as_ref()
    }

    /// Returns the write timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn attach_embedding(&mut self, embedding: EmbeddingVector, at: DateTime<Utc>) {
        self.embedding = Some(embedding);
        self.updated_at = at;
    }
}

/// Unwritten memory; the store assigns identity and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    content: String,
    memory_type: MemoryType,
    #[serde(default)]
    categories: BTreeSet<String>,
    #[serde(default = "default_importance", deserialize_with = "importance_from_number")]
    importance: i64,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    source: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<EmbeddingVector>,
}

fn default_importance() -> i64 {
    i64::from(DEFAULT_IMPORTANCE)
}

/// Accepts any JSON number and saturates it into `i64`; clamping happens on
/// stamp, so out-of-range input is never a decode error.
fn importance_from_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct ImportanceVisitor;

    impl Visitor<'_> for ImportanceVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
            Ok(i64::try_from(value).unwrap_or(i64::MAX))
        }

        #[allow(clippy::cast_possible_truncation)]
        fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
            if value.is_nan() {
                return Ok(default_importance());
            }
            // Float-to-int `as` truncates toward zero and saturates.
            Ok(value as i64)
        }
    }

    deserializer.deserialize_any(ImportanceVisitor)
}

impl NewMemory {
    /// Starts a memory with the given content and type.
    #[must_use]
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            content: content.into(),
            memory_type,
            categories: BTreeSet::new(),
            importance: default_importance(),
            is_system: false,
            source: String::new(),
            tags: BTreeSet::new(),
            embedding: None,
        }
    }

    /// Sets the importance. Out-of-range values are clamped when stamped.
    #[must_use]
    pub fn importance(mut self, importance: i64) -> Self {
        self.importance = importance;
        self
    }

    /// Marks the memory as written by the substrate itself.
    #[must_use]
    pub fn system(mut self, is_system: bool) -> Self {
        self.is_system = is_system;
        self
    }

    /// Sets the provenance string.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Adds a single tag after validating that it is not empty.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the tag is empty or whitespace.
    pub fn tag(mut self, tag: impl Into<String>) -> MemoryResult<Self> {
        let value = tag.into();
        if value.trim().is_empty() {
            return Err(MemoryError::InvalidRecord("memory tags must not be empty"));
        }
        self.tags.insert(value);
        Ok(self)
    }

    /// Extends the memory with multiple tags.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] if any supplied tag is empty.
    pub fn tags<I, S>(mut self, tags: I) -> MemoryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self = self.tag(tag)?;
        }
        Ok(self)
    }

    /// Adds categories.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] if any supplied category is empty.
    pub fn categories<I, S>(mut self, categories: I) -> MemoryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for category in categories {
            let value = category.into();
            if value.trim().is_empty() {
                return Err(MemoryError::InvalidRecord(
                    "memory categories must not be empty",
                ));
            }
            self.categories.insert(value);
        }
        Ok(self)
    }

    /// Attaches an embedding computed ahead of the write.
    #[must_use]
    pub fn embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Returns the content about to be written.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Validates the memory and turns it into a stored record.
    ///
    /// Store implementations call this on write: importance is clamped and
    /// both timestamps are set to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidRecord`] when the content is blank.
    pub fn stamp(self, id: Uuid, now: DateTime<Utc>) -> MemoryResult<MemoryRecord> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::InvalidRecord("memory content must not be empty"));
        }
        Ok(MemoryRecord {
            id,
            content: self.content,
            memory_type: self.memory_type,
            categories: self.categories,
            importance: clamp_importance(self.importance),
            is_system: self.is_system,
            source: self.source,
            tags: self.tags,
            embedding: self.embedding,
            created_at: now,
            updated_at: now,
        })
    }
}
