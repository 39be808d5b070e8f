//! Core data models used throughout docpilot.
//!
//! These types represent the documents, chunks, and vector records that flow
//! through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical knowledge-base partition within the shared vector index.
///
/// Every stored record carries its agent type in metadata, and every query
/// and delete is scoped by it, so the two knowledge bases cannot leak into
/// each other even though they share one physical index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    /// Technical standards and regulations (GOST, SNiP, specifications).
    Standards,
    /// Contracts, agreements, and internal documentation.
    Contracts,
}

impl AgentType {
    pub const ALL: [AgentType; 2] = [AgentType::Standards, AgentType::Contracts];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Standards => "standards",
            AgentType::Contracts => "contracts",
        }
    }

    /// Human-readable name used in bot greetings and panel headings.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentType::Standards => "Standards",
            AgentType::Contracts => "Contracts",
        }
    }
}

impl FromStr for AgentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standards" => Ok(AgentType::Standards),
            "contracts" => Ok(AgentType::Contracts),
            other => anyhow::bail!(
                "Unknown agent type: '{}'. Must be standards or contracts.",
                other
            ),
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted source document before chunking.
///
/// Not persisted anywhere; only its derived chunks reach the vector index.
#[derive(Debug, Clone)]
pub struct Document {
    /// Original filename (may contain non-ASCII characters).
    pub filename: String,
    /// Path or logical source the bytes came from.
    pub source: String,
    /// Plain text extracted from the file, trimmed.
    pub text: String,
    /// Size of the original file in bytes.
    pub size: u64,
    /// Lowercased extension including the dot (".pdf", ".docx").
    pub extension: String,
    /// Filename-derived document type tag, when one was recognized.
    pub doc_type: Option<String>,
}

/// A chunk of a document's text, the unit of embedding and retrieval.
///
/// Offsets are character offsets into the parent text (the pipeline handles
/// Cyrillic documents; byte offsets would split code points).
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Sequential 0-based id, contiguous within one document.
    pub chunk_id: i64,
    /// Start of the chunk window in the original text, in chars.
    pub start: usize,
    /// End of the chunk window in the original text, in chars.
    pub end: usize,
    /// Trimmed chunk text, never empty.
    pub text: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Metadata stored alongside each vector record.
///
/// The required fields make delete-by-filename and tenant scoping possible;
/// `extra` carries open-ended filename-derived tags such as `doc_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub agent_type: String,
    pub filename: String,
    pub chunk_id: i64,
    /// Path or logical source the document was ingested from.
    pub source: String,
    /// Copy of the chunk text, truncated to the index's metadata byte budget.
    pub text: String,
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, String>,
}

impl RecordMetadata {
    /// Looks up a metadata field by name for equality filtering.
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "agent_type" => Some(self.agent_type.clone()),
            "filename" => Some(self.filename.clone()),
            "chunk_id" => Some(self.chunk_id.to_string()),
            "source" => Some(self.source.clone()),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// The unit stored in the vector index: id, embedding, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A ranked match returned from the vector index.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub id: String,
    /// Similarity score in the provider's native scale, descending in rank order.
    pub score: f32,
    pub text: String,
    pub metadata: RecordMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_type_round_trips_through_str() {
        for agent in AgentType::ALL {
            assert_eq!(agent.as_str().parse::<AgentType>().unwrap(), agent);
        }
    }

    #[test]
    fn agent_type_rejects_unknown() {
        assert!("ntd".parse::<AgentType>().is_err());
        assert!("".parse::<AgentType>().is_err());
    }

    #[test]
    fn metadata_field_lookup_covers_required_and_extra() {
        let mut extra = BTreeMap::new();
        extra.insert("doc_type".to_string(), "GOST".to_string());
        let meta = RecordMetadata {
            agent_type: "standards".to_string(),
            filename: "gost_123.pdf".to_string(),
            chunk_id: 4,
            source: "uploads/gost_123.pdf".to_string(),
            text: "body".to_string(),
            extra,
        };
        assert_eq!(meta.field("agent_type").as_deref(), Some("standards"));
        assert_eq!(meta.field("chunk_id").as_deref(), Some("4"));
        assert_eq!(meta.field("doc_type").as_deref(), Some("GOST"));
        assert_eq!(meta.field("missing"), None);
    }
}
