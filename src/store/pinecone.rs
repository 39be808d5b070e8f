//! Pinecone-style HTTP backend for [`VectorIndex`].
//!
//! Talks to an index endpoint exposing `POST /vectors/upsert`,
//! `POST /query`, and `POST /vectors/delete` with `Api-Key` auth. Metadata
//! filters are sent as implicit-equality JSON objects.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use super::{MetadataFilter, VectorIndex};
use crate::config::IndexConfig;
use crate::models::{RecordMetadata, SearchMatch, VectorRecord};

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            bail!("index API key is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a backend reading the key from `PINECONE_API_KEY`.
    pub fn from_env(config: &IndexConfig) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow!("PINECONE_API_KEY environment variable not set"))?;
        Self::new(config, api_key)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}{}", self.url, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("index request {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("index API error {} on {}: {}", status, path, body_text);
        }
        response
            .json()
            .await
            .with_context(|| format!("invalid index response from {}", path))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let vectors: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": metadata_to_json(&r.metadata),
                })
            })
            .collect();
        self.post("/vectors/upsert", serde_json::json!({ "vectors": vectors }))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchMatch>> {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if !filter.is_empty() {
            body["filter"] = filter.to_json();
        }
        let json = self.post("/query", body).await?;

        let matches = json
            .get("matches")
            .and_then(|m| m.as_array())
            .ok_or_else(|| anyhow!("invalid query response: missing matches array"))?;

        matches.iter().map(parse_match).collect()
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<()> {
        self.post(
            "/vectors/delete",
            serde_json::json!({ "filter": filter.to_json() }),
        )
        .await?;
        Ok(())
    }
}

/// Flattens metadata into the provider's flat key/value object. `chunk_id`
/// goes out as a number; everything else as strings.
fn metadata_to_json(metadata: &RecordMetadata) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "agent_type".to_string(),
        serde_json::Value::String(metadata.agent_type.clone()),
    );
    map.insert(
        "filename".to_string(),
        serde_json::Value::String(metadata.filename.clone()),
    );
    map.insert("chunk_id".to_string(), serde_json::json!(metadata.chunk_id));
    map.insert(
        "source".to_string(),
        serde_json::Value::String(metadata.source.clone()),
    );
    map.insert(
        "text".to_string(),
        serde_json::Value::String(metadata.text.clone()),
    );
    for (k, v) in &metadata.extra {
        map.insert(k.clone(), serde_json::Value::String(v.clone()));
    }
    serde_json::Value::Object(map)
}

/// Parses one match from the provider's response.
///
/// Numbers come back as floats (the provider has a single number type), so
/// `chunk_id` is read as f64 and truncated.
fn parse_match(value: &serde_json::Value) -> Result<SearchMatch> {
    let id = value
        .get("id")
        .and_then(|i| i.as_str())
        .ok_or_else(|| anyhow!("match missing id"))?
        .to_string();
    let score = value.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
    let meta = value
        .get("metadata")
        .and_then(|m| m.as_object())
        .ok_or_else(|| anyhow!("match {} missing metadata", id))?;

    let str_field = |key: &str| -> String {
        meta.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let chunk_id = meta
        .get("chunk_id")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as i64;

    let mut extra = BTreeMap::new();
    for (k, v) in meta {
        if matches!(
            k.as_str(),
            "agent_type" | "filename" | "chunk_id" | "source" | "text"
        ) {
            continue;
        }
        if let Some(s) = v.as_str() {
            extra.insert(k.clone(), s.to_string());
        }
    }

    let metadata = RecordMetadata {
        agent_type: str_field("agent_type"),
        filename: str_field("filename"),
        chunk_id,
        source: str_field("source"),
        text: str_field("text"),
        extra,
    };
    Ok(SearchMatch {
        id,
        score,
        text: metadata.text.clone(),
        metadata,
    })
}
