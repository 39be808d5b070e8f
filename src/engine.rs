//! Retrieval engine: the ingest / answer / delete / list orchestration.
//!
//! One engine is built per knowledge base at startup and shared behind an
//! `Arc` by the CLI, the web panel, and the bot. All external services are
//! injected through the [`Embedder`], [`Generator`], and index seams.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::embedding::{Embedder, InputType};
use crate::generation::Generator;
use crate::models::{AgentType, Document, RecordMetadata, SearchMatch, VectorRecord};
use crate::store::{record_id, MetadataFilter, ScopedIndex};

/// Byte budget for the chunk-text copy kept in record metadata. The index
/// caps metadata size per record; truncation here is char-safe.
const METADATA_TEXT_BYTE_BUDGET: usize = 8000;

const SYSTEM_PROMPT: &str = "You are a document assistant. Answer strictly from the \
supplied document passages. If the passages do not contain the answer, say that the \
documents do not cover the question. Do not invent facts.";

/// A citation attached to a generated answer.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub filename: String,
    pub score: f32,
    pub chunk_id: i64,
    pub doc_type: Option<String>,
}

/// A generated answer plus the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

pub struct RetrievalEngine {
    agent_type: AgentType,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: ScopedIndex,
    chunker: Chunker,
    top_k: usize,
    upsert_batch_size: usize,
}

impl RetrievalEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_type: AgentType,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: ScopedIndex,
        chunker: Chunker,
        top_k: usize,
        upsert_batch_size: usize,
    ) -> Self {
        Self {
            agent_type,
            embedder,
            generator,
            index,
            chunker,
            top_k,
            upsert_batch_size,
        }
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Chunks, embeds, and stores one document. Returns the stored chunk
    /// count.
    ///
    /// The embedding step is all-or-nothing (no records are written when any
    /// text fails to embed); the upsert step is not (a failed batch leaves
    /// earlier batches stored, and the error says how many).
    pub async fn ingest(&self, doc: &Document) -> Result<usize> {
        let chunks = self.chunker.chunk(&doc.text);
        if chunks.is_empty() {
            info!(filename = %doc.filename, "document produced no chunks");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts, InputType::Document)
            .await
            .with_context(|| format!("embedding failed for {}", doc.filename))?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                let mut extra = BTreeMap::new();
                if let Some(doc_type) = &doc.doc_type {
                    extra.insert("doc_type".to_string(), doc_type.clone());
                }
                VectorRecord {
                    id: record_id(self.agent_type, &doc.filename, chunk.chunk_id),
                    values,
                    metadata: RecordMetadata {
                        agent_type: self.agent_type.as_str().to_string(),
                        filename: doc.filename.clone(),
                        chunk_id: chunk.chunk_id,
                        source: doc.source.clone(),
                        text: truncate_to_bytes(&chunk.text, METADATA_TEXT_BYTE_BUDGET),
                        extra,
                    },
                }
            })
            .collect();

        let stored = self.index.upsert(&records, self.upsert_batch_size).await?;
        info!(
            agent = %self.agent_type,
            filename = %doc.filename,
            chunks = stored,
            "document ingested"
        );
        Ok(stored)
    }

    /// Answers a question from the knowledge base.
    ///
    /// A failed retrieval query degrades to an empty context rather than an
    /// error: the model then states that the documents do not cover the
    /// question. Embedding and generation failures propagate.
    pub async fn answer(&self, question: &str, top_k: Option<usize>) -> Result<Answer> {
        let top_k = top_k.unwrap_or(self.top_k);
        let vector = self
            .embedder
            .embed_query(question)
            .await
            .context("failed to embed question")?;

        let matches = match self.index.query(&vector, top_k, MetadataFilter::new()).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(agent = %self.agent_type, error = %e, "retrieval query failed");
                Vec::new()
            }
        };

        let user_prompt = build_user_prompt(question, &matches);
        let text = self
            .generator
            .complete(SYSTEM_PROMPT, &user_prompt)
            .await
            .context("answer generation failed")?;

        let sources = matches
            .iter()
            .map(|m| SourceRef {
                filename: m.metadata.filename.clone(),
                score: m.score,
                chunk_id: m.metadata.chunk_id,
                doc_type: m.metadata.extra.get("doc_type").cloned(),
            })
            .collect();

        Ok(Answer { text, sources })
    }

    /// Removes every chunk of one document from this knowledge base.
    pub async fn delete_document(&self, filename: &str) -> Result<()> {
        self.index
            .delete_by_filename(filename)
            .await
            .with_context(|| format!("failed to delete {}", filename))?;
        info!(agent = %self.agent_type, filename, "document deleted");
        Ok(())
    }

    /// Lists filenames currently stored in this knowledge base.
    pub async fn list_documents(&self) -> Result<Vec<String>> {
        self.index.list_filenames(self.embedder.dims()).await
    }
}

fn build_user_prompt(question: &str, matches: &[SearchMatch]) -> String {
    let context = matches
        .iter()
        .enumerate()
        .map(|(i, m)| format!("Document {}:\n{}", i + 1, m.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context from the documents:\n{}\n\nUser question: {}\n\nAnswer:",
        context, question
    )
}

/// Truncates to at most `budget` bytes without splitting a code point.
fn truncate_to_bytes(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
