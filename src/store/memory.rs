//! In-memory vector index, used by tests and local experiments.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{MetadataFilter, VectorIndex};
use crate::models::{SearchMatch, VectorRecord};

/// Brute-force cosine-similarity index held in a `RwLock`ed vec.
#[derive(Default)]
pub struct InMemoryIndex {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchMatch>> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        let mut matches: Vec<SearchMatch> = stored
            .iter()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| SearchMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                text: r.metadata.text.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        stored.retain(|r| !filter.matches(&r.metadata));
        Ok(())
    }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
