//! Memory store backed by a PostgREST table.
//!
//! Records live in one `memories` table; vector search goes through the
//! `match_memories(query_embedding, match_threshold, match_count)` function.
//! Ranking is re-applied locally so the ordering contract holds whatever the
//! server returns.

use std::fmt;

use agent_config::EndpointSettings;
use agent_memory::{
    EmbeddingVector, MemoryError, MemoryRecord, MemoryResult, MemoryStore, NewMemory,
    ScoredRecord, rank_by_importance, rank_by_similarity,
};
use async_trait::async_trait;
use chrono::Utc;
use hyper::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AdapterError, AdapterResult};
use crate::http_client::JsonClient;

const DEFAULT_TABLE: &str = "memories";
const MATCH_FUNCTION: &str = "rpc/match_memories";
const RETURN_REPRESENTATION: (&str, &str) = ("prefer", "return=representation");
const COUNT_EXACT: (&str, &str) = ("prefer", "count=exact");

/// PostgREST-backed [`MemoryStore`].
#[derive(Clone)]
pub struct RestMemoryStore {
    client: JsonClient,
    table: String,
}

impl fmt::Debug for RestMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestMemoryStore")
            .field("endpoint", &self.client.base_url())
            .field("table", &self.table)
            .finish()
    }
}

impl RestMemoryStore {
    /// Connects to the REST root given in `settings`. The key is sent both as
    /// `apikey` and as a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for an invalid URL or key.
    pub fn new(settings: &EndpointSettings) -> AdapterResult<Self> {
        let mut client = JsonClient::new(settings)?;
        if let Some(key) = &settings.api_key {
            client = client.with_header("apikey", key)?;
        }
        Ok(Self {
            client,
            table: DEFAULT_TABLE.to_owned(),
        })
    }

    /// Uses a table other than `memories`.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    async fn select(&self, query: &[(&str, &str)]) -> AdapterResult<Vec<MemoryRecord>> {
        let uri = self.client.endpoint(&self.table, query)?;
        self.client
            .send::<()>(Method::GET, uri, None, &[])
            .await?
            .decode()
    }
}

#[async_trait]
impl MemoryStore for RestMemoryStore {
    async fn write(&self, memory: NewMemory) -> MemoryResult<MemoryRecord> {
        let record = memory.stamp(Uuid::new_v4(), Utc::now())?;
        let uri = self.client.endpoint(&self.table, &[])?;
        let mut rows: Vec<MemoryRecord> = self
            .client
            .send(Method::POST, uri, Some(&record), &[RETURN_REPRESENTATION])
            .await?
            .decode()?;
        debug!(id = %record.id(), table = %self.table, "memory written");
        Ok(rows.pop().unwrap_or(record))
    }

    async fn get(&self, id: Uuid) -> MemoryResult<MemoryRecord> {
        let filter = format!("eq.{id}");
        self.select(&[("id", filter.as_str()), ("limit", "1")])
            .await?
            .pop()
            .ok_or(MemoryError::NotFound(id))
    }

    async fn text_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let pattern = ilike_pattern(query);
        let limit = limit.to_string();
        let mut records = self
            .select(&[
                ("content", pattern.as_str()),
                ("order", "importance.desc,created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .await?;
        rank_by_importance(&mut records);
        Ok(records)
    }

    async fn semantic_search(
        &self,
        query: &EmbeddingVector,
        limit: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<ScoredRecord>> {
        let request = MatchRequest {
            query_embedding: query,
            match_threshold: threshold,
            match_count: limit,
        };
        let rows: Vec<MatchRow> = self
            .client
            .post_json(MATCH_FUNCTION, &request)
            .await?;
        Ok(collect_matches(rows, limit, threshold))
    }

    async fn missing_embeddings(&self, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let limit = limit.to_string();
        Ok(self
            .select(&[
                ("embedding", "is.null"),
                ("order", "created_at.asc"),
                ("limit", limit.as_str()),
            ])
            .await?)
    }

    async fn set_embedding(&self, id: Uuid, embedding: EmbeddingVector) -> MemoryResult<()> {
        let filter = format!("eq.{id}");
        let uri = self
            .client
            .endpoint(&self.table, &[("id", filter.as_str()), ("embedding", "is.null")])?;
        let rows: Vec<serde_json::Value> = self
            .client
            .send(
                Method::PATCH,
                uri,
                Some(&EmbeddingPatch {
                    embedding: &embedding,
                }),
                &[RETURN_REPRESENTATION],
            )
            .await?
            .decode()?;
        if rows.is_empty() {
            return Err(MemoryError::InvalidRecord(
                "record missing or already embedded",
            ));
        }
        Ok(())
    }

    async fn count_tagged(&self, tag: &str) -> MemoryResult<usize> {
        let filter = contains_tag(tag);
        let uri = self.client.endpoint(
            &self.table,
            &[("tags", filter.as_str()), ("select", "id"), ("limit", "1")],
        )?;
        let reply = self
            .client
            .send::<()>(Method::GET, uri, None, &[COUNT_EXACT])
            .await?;
        reply
            .header("content-range")
            .and_then(parse_content_range_total)
            .ok_or_else(|| AdapterError::response("missing exact count in content-range").into())
    }

    async fn recent_tagged(&self, tag: &str, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        let filter = contains_tag(tag);
        let limit = limit.to_string();
        Ok(self
            .select(&[
                ("tags", filter.as_str()),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .await?)
    }
}

#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a EmbeddingVector,
    match_threshold: f32,
    match_count: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingPatch<'a> {
    embedding: &'a EmbeddingVector,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    #[serde(flatten)]
    record: MemoryRecord,
    similarity: f32,
}

/// `*` is PostgREST's `ilike` wildcard; a literal one in the query is dropped.
fn ilike_pattern(query: &str) -> String {
    format!("ilike.*{}*", query.trim().replace('*', ""))
}

fn contains_tag(tag: &str) -> String {
    format!("cs.{{{tag}}}")
}

/// Total from `Content-Range: 0-24/3573` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn collect_matches(rows: Vec<MatchRow>, limit: usize, threshold: f32) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = rows
        .into_iter()
        .filter(|row| row.similarity.is_finite() && row.similarity >= threshold)
        .map(|row| ScoredRecord {
            record: row.record,
            similarity: row.similarity,
        })
        .collect();
    rank_by_similarity(&mut scored);
    scored.truncate(limit);
    scored
}
