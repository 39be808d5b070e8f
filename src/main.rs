//! # docpilot CLI
//!
//! The `docpilot` binary drives the document pipeline: configuration checks,
//! document ingestion, question answering, catalog maintenance, and the two
//! long-lived front-ends (browser upload panel and Telegram bot).
//!
//! ## Usage
//!
//! ```bash
//! docpilot --config ./docpilot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docpilot check` | Validate configuration and report missing credentials |
//! | `docpilot ingest --agent <kb> --file <path>` | Ingest one document |
//! | `docpilot ingest --agent <kb> --dir <path>` | Ingest every PDF/DOCX in a directory |
//! | `docpilot ask <kb> "<question>"` | Answer a question from a knowledge base |
//! | `docpilot delete <kb> <filename>` | Remove a document's chunks |
//! | `docpilot list <kb>` | List stored documents |
//! | `docpilot serve admin` | Start the browser upload panel |
//! | `docpilot serve bot` | Start the Telegram bot |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use docpilot::bot::TelegramBot;
use docpilot::chunker::Chunker;
use docpilot::config::{load_config, missing_env_keys, Config, DEFAULT_CONFIG_PATH};
use docpilot::embedding::VoyageClient;
use docpilot::engine::RetrievalEngine;
use docpilot::extract;
use docpilot::generation::ChatClient;
use docpilot::models::AgentType;
use docpilot::server::{run_server, AppState};
use docpilot::store::pinecone::PineconeIndex;
use docpilot::store::{ScopedIndex, VectorIndex};

/// docpilot — document question answering over PDF/DOCX knowledge bases.
#[derive(Parser)]
#[command(
    name = "docpilot",
    about = "Document question answering over PDF/DOCX knowledge bases",
    version,
    long_about = "docpilot ingests PDF and DOCX documents into a filterable vector index \
    (chunking, embedding, metadata tagging) and answers natural-language questions from \
    the stored chunks via a CLI, a browser upload panel, and a Telegram bot."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and report each missing credential.
    Check,

    /// Ingest one document or a directory of documents.
    ///
    /// Directory ingestion picks up every `.pdf` and `.docx` file,
    /// continues past per-file failures, and prints a summary.
    Ingest {
        /// Target knowledge base: `standards` or `contracts`.
        #[arg(long)]
        agent: String,

        /// Ingest a single file.
        #[arg(long, conflicts_with = "dir")]
        file: Option<PathBuf>,

        /// Ingest every supported file under a directory (recursive).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Answer a question from a knowledge base.
    Ask {
        /// Knowledge base: `standards` or `contracts`.
        agent: String,

        /// The question, in plain text.
        question: String,

        /// Number of passages to retrieve (defaults to the configured value).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Remove all chunks of one document from a knowledge base.
    Delete {
        /// Knowledge base: `standards` or `contracts`.
        agent: String,

        /// Filename as it was ingested.
        filename: String,
    },

    /// List documents stored in a knowledge base.
    List {
        /// Knowledge base: `standards` or `contracts`.
        agent: String,
    },

    /// Run a long-lived front-end.
    Serve {
        #[command(subcommand)]
        frontend: ServeCommands,
    },
}

#[derive(Subcommand)]
enum ServeCommands {
    /// Browser upload panel (upload, delete, list documents).
    Admin,
    /// Telegram bot answering from the configured knowledge base.
    Bot,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => run_check(&cli.config),
        Commands::Ingest { agent, file, dir } => {
            let config = load_config(&cli.config)?;
            let agent: AgentType = agent.parse()?;
            let engine = build_engine(&config, agent)?;
            match (file, dir) {
                (Some(path), None) => run_ingest_file(&engine, &path).await,
                (None, Some(path)) => run_ingest_dir(&engine, &path).await,
                _ => bail!("exactly one of --file or --dir is required"),
            }
        }
        Commands::Ask {
            agent,
            question,
            top_k,
        } => {
            let config = load_config(&cli.config)?;
            let agent: AgentType = agent.parse()?;
            let engine = build_engine(&config, agent)?;
            run_ask(&engine, &question, top_k).await
        }
        Commands::Delete { agent, filename } => {
            let config = load_config(&cli.config)?;
            let agent: AgentType = agent.parse()?;
            let engine = build_engine(&config, agent)?;
            engine.delete_document(&filename).await?;
            println!("deleted {} from {}", filename, agent);
            Ok(())
        }
        Commands::List { agent } => {
            let config = load_config(&cli.config)?;
            let agent: AgentType = agent.parse()?;
            let engine = build_engine(&config, agent)?;
            let documents = engine.list_documents().await?;
            println!("documents in {} ({}):", agent, documents.len());
            for name in documents {
                println!("  {}", name);
            }
            Ok(())
        }
        Commands::Serve { frontend } => {
            init_tracing();
            let config = load_config(&cli.config)?;
            match frontend {
                ServeCommands::Admin => run_serve_admin(&config).await,
                ServeCommands::Bot => run_serve_bot(&config).await,
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Builds one knowledge base's engine from config and environment keys.
fn build_engine(config: &Config, agent: AgentType) -> Result<Arc<RetrievalEngine>> {
    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::from_env(&config.index)?);
    Ok(build_engine_over(config, agent, index)?)
}

/// Like [`build_engine`] but sharing one index backend across tenants.
fn build_engine_over(
    config: &Config,
    agent: AgentType,
    index: Arc<dyn VectorIndex>,
) -> Result<Arc<RetrievalEngine>> {
    let embedder = Arc::new(VoyageClient::from_env(&config.embedding)?);
    let generator = Arc::new(ChatClient::from_env(&config.generation)?);
    let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.overlap)?;
    Ok(Arc::new(RetrievalEngine::new(
        agent,
        embedder,
        generator,
        ScopedIndex::new(index, Some(agent)),
        chunker,
        config.retrieval.top_k,
        config.retrieval.upsert_batch_size,
    )))
}

fn run_check(config_path: &Path) -> Result<()> {
    println!("check");
    match load_config(config_path) {
        Ok(config) => {
            println!("  config: ok ({})", config_path.display());
            println!("  index url: {}", config.index.url);
            println!(
                "  embedding: {} ({} dims)",
                config.embedding.model, config.embedding.dims
            );
            println!("  generation: {}", config.generation.model);
            println!(
                "  chunking: size {} overlap {}",
                config.chunking.chunk_size, config.chunking.overlap
            );
            println!("  bot knowledge base: {}", config.bot.agent_type);
        }
        Err(e) => {
            println!("  config: INVALID");
            return Err(e);
        }
    }

    let missing = missing_env_keys(true);
    if missing.is_empty() {
        println!("  credentials: all set");
        return Ok(());
    }
    for key in &missing {
        println!("  credential MISSING: {}", key);
    }
    let core: Vec<&str> = missing
        .iter()
        .copied()
        .filter(|k| *k != "TELEGRAM_BOT_TOKEN")
        .collect();
    if core.is_empty() {
        // The bot token is only needed for `serve bot`.
        println!("  (TELEGRAM_BOT_TOKEN is only required for `serve bot`)");
        return Ok(());
    }
    bail!("missing credentials: {}", core.join(", "));
}

async fn run_ingest_file(engine: &RetrievalEngine, path: &Path) -> Result<()> {
    let doc = extract::extract_from_path(path)?;
    let chunks = engine.ingest(&doc).await?;
    println!("ingest");
    println!("  file: {}", doc.filename);
    if let Some(doc_type) = &doc.doc_type {
        println!("  doc type: {}", doc_type);
    }
    println!("  chunks stored: {}", chunks);
    Ok(())
}

async fn run_ingest_dir(engine: &RetrievalEngine, dir: &Path) -> Result<()> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if extract::is_supported(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("no .pdf or .docx files found under {}", dir.display());
    }

    let total = files.len();
    let mut ingested = 0usize;
    let mut chunks_total = 0usize;
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    for path in files {
        let result = match extract::extract_from_path(&path) {
            Ok(doc) => engine.ingest(&doc).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(chunks) => {
                ingested += 1;
                chunks_total += chunks;
                println!("  ok: {} ({} chunks)", path.display(), chunks);
            }
            Err(e) => {
                eprintln!("  failed: {}: {:#}", path.display(), e);
                failures.push((path, format!("{:#}", e)));
            }
        }
    }

    println!("ingest");
    println!("  files found: {}", total);
    println!("  ingested: {}", ingested);
    println!("  chunks stored: {}", chunks_total);
    println!("  failed: {}", failures.len());
    Ok(())
}

async fn run_ask(engine: &RetrievalEngine, question: &str, top_k: Option<usize>) -> Result<()> {
    let answer = engine.answer(question, top_k).await?;
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        let mut seen: Vec<&str> = Vec::new();
        for source in &answer.sources {
            if seen.contains(&source.filename.as_str()) {
                continue;
            }
            seen.push(&source.filename);
            println!(
                "  {}. {} (relevance: {:.2})",
                seen.len(),
                source.filename,
                source.score
            );
        }
    }
    Ok(())
}

async fn run_serve_admin(config: &Config) -> Result<()> {
    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::from_env(&config.index)?);
    let mut engines = HashMap::new();
    for agent in AgentType::ALL {
        engines.insert(agent, build_engine_over(config, agent, index.clone())?);
    }
    run_server(&config.server.bind, AppState::new(engines)).await
}

async fn run_serve_bot(config: &Config) -> Result<()> {
    let agent: AgentType = config.bot.agent_type.parse()?;
    let engine = build_engine(config, agent)?;
    let bot = TelegramBot::from_env(
        engine,
        Duration::from_secs(config.bot.answer_timeout_secs),
    )?;
    bot.run().await
}
