//! Configuration loading and validation.
//!
//! Settings come from a TOML file; credentials come from the environment
//! (`VOYAGE_API_KEY`, `PINECONE_API_KEY`, `DEEPSEEK_API_KEY`, and
//! `TELEGRAM_BOT_TOKEN` for the bot). [`load_config`] validates everything
//! it can before any network client is built.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "docpilot.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

/// External vector index endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the index (e.g. `https://my-index-abc123.svc.pinecone.io`).
    pub url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Embedding dimensionality; must match the index.
    pub dims: usize,
    /// Override for the embeddings endpoint base URL (tests point this at a
    /// mock server).
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "voyage-multilingual-2".to_string(),
            dims: 1024,
            url: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            url: "https://api.deepseek.com".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages retrieved per question.
    pub top_k: usize,
    /// Records per upsert request.
    pub upsert_batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 7,
            upsert_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Which knowledge base the bot answers from.
    pub agent_type: String,
    /// Hard ceiling on one question's end-to-end processing.
    pub answer_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            agent_type: "standards".to_string(),
            answer_timeout_secs: 120,
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.index.url.is_empty() {
        bail!("index.url must be set");
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.upsert_batch_size == 0 {
        bail!("retrieval.upsert_batch_size must be >= 1");
    }
    config.bot.agent_type.parse::<crate::models::AgentType>()?;
    Ok(())
}

/// Names of required environment credentials that are not set.
///
/// `TELEGRAM_BOT_TOKEN` is only required when running the bot.
pub fn missing_env_keys(include_bot: bool) -> Vec<&'static str> {
    let mut required = vec!["VOYAGE_API_KEY", "PINECONE_API_KEY", "DEEPSEEK_API_KEY"];
    if include_bot {
        required.push("TELEGRAM_BOT_TOKEN");
    }
    required
        .into_iter()
        .filter(|key| std::env::var(key).is_err())
        .collect()
}
