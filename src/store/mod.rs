//! Vector index abstraction and tenant scoping.
//!
//! [`VectorIndex`] is the seam to the external vector database; the
//! production backend is [`pinecone::PineconeIndex`] and tests use
//! [`memory::InMemoryIndex`]. [`ScopedIndex`] wraps a backend with an
//! optional tenant tag so one shared physical index serves both knowledge
//! bases without leaks.

pub mod memory;
pub mod pinecone;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::{AgentType, RecordMetadata, SearchMatch, VectorRecord};

/// Cap on the zero-vector scan used by [`ScopedIndex::list_filenames`].
const LIST_SCAN_TOP_K: usize = 10_000;

/// Equality filter over record metadata fields.
///
/// Serialized for the provider as an implicit-equality JSON object
/// (`{"field": "value"}`); matched locally by the in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    fields: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether all filter fields equal the corresponding metadata fields.
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.fields
            .iter()
            .all(|(key, value)| metadata.field(key).as_deref() == Some(value.as_str()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Raw vector index operations, unscoped.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces records by id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Returns up to `top_k` matches in descending similarity order.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchMatch>>;

    /// Deletes every record matching the filter. Success means the delete
    /// was accepted, not that matches remained.
    async fn delete(&self, filter: &MetadataFilter) -> Result<()>;
}

/// A vector index view bound to one tenant.
///
/// Every query and delete gets the tenant tag AND-ed into its filter; an
/// unbound view (`agent_type: None`) sees the whole index.
#[derive(Clone)]
pub struct ScopedIndex {
    index: Arc<dyn VectorIndex>,
    agent_type: Option<AgentType>,
}

impl ScopedIndex {
    pub fn new(index: Arc<dyn VectorIndex>, agent_type: Option<AgentType>) -> Self {
        Self { index, agent_type }
    }

    pub fn agent_type(&self) -> Option<AgentType> {
        self.agent_type
    }

    fn scoped(&self, filter: MetadataFilter) -> MetadataFilter {
        match self.agent_type {
            Some(agent) => filter.eq("agent_type", agent.as_str()),
            None => filter,
        }
    }

    /// Upserts records in fixed-size batches, in order.
    ///
    /// There is no rollback: if a later batch fails, earlier batches stay
    /// stored and the error reports how many records made it.
    pub async fn upsert(&self, records: &[VectorRecord], batch_size: usize) -> Result<usize> {
        let total = records.len();
        let mut stored = 0usize;
        for (i, batch) in records.chunks(batch_size.max(1)).enumerate() {
            self.index.upsert(batch).await.with_context(|| {
                format!("upsert batch {} failed; stored {} of {} records", i + 1, stored, total)
            })?;
            stored += batch.len();
            debug!(batch = i + 1, stored, total, "upserted batch");
        }
        Ok(stored)
    }

    /// Similarity query scoped to the bound tenant.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: MetadataFilter,
    ) -> Result<Vec<SearchMatch>> {
        self.index.query(vector, top_k, &self.scoped(filter)).await
    }

    /// Deletes all chunks of one document within the bound tenant.
    pub async fn delete_by_filename(&self, filename: &str) -> Result<()> {
        let filter = self.scoped(MetadataFilter::new().eq("filename", filename));
        self.index.delete(&filter).await
    }

    /// Lists distinct filenames stored for the bound tenant.
    ///
    /// The provider has no listing API, so this scans via a zero-vector
    /// query capped at 10 000 matches and deduplicates filenames from the
    /// returned metadata. O(index size); fine at this catalog's scale.
    pub async fn list_filenames(&self, dims: usize) -> Result<Vec<String>> {
        let zero = vec![0.0f32; dims];
        let matches = self
            .index
            .query(&zero, LIST_SCAN_TOP_K, &self.scoped(MetadataFilter::new()))
            .await?;
        let mut seen = std::collections::BTreeSet::new();
        for m in matches {
            seen.insert(m.metadata.filename.clone());
        }
        Ok(seen.into_iter().collect())
    }
}

/// Builds the deterministic record id for one chunk.
///
/// The provider restricts ids to ASCII, so the filename is stripped to
/// `[A-Za-z0-9._-]`. Stripping is lossy (two Cyrillic filenames can strip to
/// the same string), so an 8-hex-char SHA-256 tag of the raw filename is
/// appended to keep ids collision-free per document.
pub fn record_id(agent_type: AgentType, filename: &str, chunk_id: i64) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let digest = Sha256::digest(filename.as_bytes());
    let tag: String = digest
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect();
    format!(
        "{}_{}-{}_chunk_{}",
        agent_type.as_str(),
        sanitized,
        tag,
        chunk_id
    )
}
