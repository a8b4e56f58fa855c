//! # DocQuery
//!
//! An agentic document question-answering engine.
//!
//! DocQuery ingests documents in several formats (PDF, DOCX, plain text,
//! packet captures), chunks and embeds them into a local SQLite-backed
//! vector index, and answers questions through a think/act/observe
//! reasoning loop that picks from a closed tool catalogue. Conversations
//! persist to a JSON interaction log so follow-up questions can refer back
//! to earlier answers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Extractors  │──▶│   Pipeline   │──▶│  SQLite   │
//! │ PDF/DOCX/    │   │ Chunk+Embed  │   │  vectors  │
//! │ TXT/PCAP     │   └──────────────┘   └─────┬─────┘
//! └─────────────┘                             │
//!                   ┌─────────────┐           │
//!      question ───▶│  Reasoning  │◀──────────┘
//!                   │    loop     │──▶ tools: search, calc,
//!                   └──────┬──────┘    analysis, web, wiki
//!                          ▼
//!                   ┌─────────────┐
//!                   │   Memory    │  JSON log + feedback
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqa init                          # create storage
//! dqa ingest report.pdf             # load a document
//! dqa ask "What databases are mentioned?"
//! dqa history --limit 5
//! dqa feedback 1 helpful
//! dqa stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`capture`] | Packet capture summarization |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding providers and vector math |
//! | [`index`] | Vector index build, query, persistence |
//! | [`tools`] | Tool catalogue and dispatch |
//! | [`agent`] | Think/act/observe reasoning loop |
//! | [`memory`] | Durable conversation memory |
//! | [`stats`] | Usage aggregates |
//! | [`ingest`] | File-to-index pipeline |
//! | [`session`] | Ties storage, index, memory, and the loop together |

pub mod agent;
pub mod capture;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod session;
pub mod stats;
pub mod tools;
