//! # docpilot
//!
//! A multi-tenant document question-answering pipeline.
//!
//! docpilot ingests PDF and DOCX documents, splits them into overlapping
//! sentence-boundary chunks, embeds the chunks, and stores them in a
//! filterable vector index. Questions are answered by retrieving the most
//! relevant chunks and feeding them to a chat-completion model. Two
//! knowledge bases (standards and contracts) share one physical index,
//! partitioned by a metadata tag.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌────────────┐
//! │  Extract  │──▶│   Pipeline    │──▶│   Vector    │
//! │ PDF/DOCX  │   │ Chunk+Embed  │   │   index     │
//! └───────────┘   └──────────────┘   └─────┬──────┘
//!                                          │
//!                     ┌────────────────────┼──────────────┐
//!                     ▼                    ▼              ▼
//!               ┌──────────┐        ┌───────────┐   ┌──────────┐
//!               │   CLI    │        │  Upload   │   │ Telegram │
//!               │(docpilot)│        │  panel    │   │   bot    │
//!               └──────────┘        └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docpilot check                               # verify config and credentials
//! docpilot ingest --agent standards --dir ./docs
//! docpilot ask standards "What concrete grade is required?"
//! docpilot serve admin                          # browser upload panel
//! docpilot serve bot                            # Telegram front-end
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunker`] | Sentence-boundary overlapping chunker |
//! | [`extract`] | PDF/DOCX text extraction |
//! | [`embedding`] | Embedding client with rate-limit pacing |
//! | [`store`] | Vector index backends and tenant scoping |
//! | [`generation`] | Chat-completion client |
//! | [`engine`] | Ingest / answer / delete orchestration |
//! | [`server`] | Browser upload panel |
//! | [`bot`] | Telegram long-polling front-end |

pub mod bot;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod generation;
pub mod models;
pub mod server;
pub mod store;
