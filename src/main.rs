//! # DocQuery CLI (`dqa`)
//!
//! The `dqa` binary is the interface to the document question-answering
//! engine: ingest documents, ask questions through the reasoning loop,
//! and manage conversation memory.
//!
//! ## Usage
//!
//! ```bash
//! dqa --config ./config/dqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa init` | Create the SQLite index store and memory log |
//! | `dqa ingest <file>` | Extract, chunk, embed, and index a document |
//! | `dqa ask "<question>"` | Answer a question with the reasoning loop |
//! | `dqa history` | Show recent interactions |
//! | `dqa feedback <id> <tag>` | Rate an earlier answer |
//! | `dqa stats` | Usage aggregates from the interaction log |
//! | `dqa clear-memory` | Drop all recorded interactions |
//! | `dqa export <path>` | Write the full interaction log to a file |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docquery::agent::OpenAiChat;
use docquery::models::ReasoningStep;
use docquery::{config, db, session::Session, stats};

/// DocQuery — an agentic document question-answering engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "DocQuery — ask questions about PDF, DOCX, text, and packet capture files",
    version,
    long_about = "DocQuery ingests documents into a local vector index and answers questions \
    through a reasoning loop that searches the document, calculates, analyzes text, and \
    optionally reaches out to web search and Wikipedia."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize storage.
    ///
    /// Creates the SQLite index database and the memory log directory.
    /// Idempotent — running it again is safe.
    Init,

    /// Ingest a document into the index.
    ///
    /// The format is taken from the file extension: `.pdf`, `.docx`,
    /// `.txt`, `.pcap`, or `.pcapng`. By default the new document replaces
    /// the current session.
    Ingest {
        /// File to ingest.
        file: PathBuf,

        /// Add to the current session instead of replacing it.
        #[arg(long)]
        append: bool,
    },

    /// Ask a question about the loaded document.
    ///
    /// Runs the reasoning loop with the full tool catalogue and records
    /// the interaction in memory. Requires `OPENAI_API_KEY`.
    Ask {
        /// The question to answer.
        question: String,

        /// Print the reasoning trace alongside the answer.
        #[arg(long)]
        trace: bool,
    },

    /// Show recent interactions.
    History {
        /// Maximum number of interactions to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Rate an earlier answer.
    Feedback {
        /// Interaction id as shown by `dqa history`.
        id: usize,

        /// One of: helpful, not_helpful.
        #[arg(value_parser = ["helpful", "not_helpful"])]
        tag: String,
    },

    /// Show usage aggregates from the interaction log.
    Stats,

    /// Drop all recorded interactions.
    ClearMemory,

    /// Write the full interaction log to a file.
    Export {
        /// Destination path for the JSON export.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.storage.index_path).await?;
            db::ensure_schema(&pool).await?;
            pool.close().await;
            if let Some(parent) = cfg.storage.memory_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            println!("Storage initialized successfully.");
        }
        Commands::Ingest { file, append } => {
            let mut session = Session::open(cfg).await?;
            let summary = session.ingest_file(&file, append).await?;
            println!(
                "Ingested {} ({}): {} chunks",
                summary.name, summary.format, summary.chunks
            );
            if let Some(pages) = summary.metadata.pages {
                println!("Pages: {}", pages);
            }
            if let Some(sections) = summary.metadata.sections {
                println!("Sections: {}", sections);
            }
            if let (Some(total), Some(analyzed)) = (
                summary.metadata.packets_total,
                summary.metadata.packets_analyzed,
            ) {
                println!("Packets: {} total, {} analyzed", total, analyzed);
            }
            session.close().await;
        }
        Commands::Ask { question, trace } => {
            let mut session = Session::open(cfg).await?;
            let llm = OpenAiChat::new(&session.config().llm)?;
            let interaction = session.ask(&question, &llm).await?;

            if trace {
                for step in &interaction.steps {
                    match step {
                        ReasoningStep::Thought { text } => println!("Thought: {}", text),
                        ReasoningStep::Action { tool, input } => {
                            println!("Action: {} ({})", tool, input)
                        }
                        ReasoningStep::Observation { text } => println!("Observation: {}", text),
                        ReasoningStep::FinalAnswer { .. } => {}
                    }
                }
                println!();
            }
            println!("{}", interaction.answer);
            println!(
                "\n[interaction {} — rate with: dqa feedback {} helpful|not_helpful]",
                session.memory().len(),
                session.memory().len()
            );
            session.close().await;
        }
        Commands::History { limit } => {
            let session = Session::open(cfg).await?;
            let interactions = session.memory().all();
            if interactions.is_empty() {
                println!("No interactions recorded.");
            }
            let start = interactions.len().saturating_sub(limit);
            for (i, interaction) in interactions.iter().enumerate().skip(start) {
                let feedback = interaction
                    .feedback
                    .as_deref()
                    .map(|f| format!(" [{}]", f))
                    .unwrap_or_default();
                println!(
                    "{}. ({}){} {}",
                    i + 1,
                    interaction.timestamp.format("%Y-%m-%d %H:%M"),
                    feedback,
                    interaction.query
                );
                println!("   {}", interaction.answer.replace('\n', "\n   "));
            }
            session.close().await;
        }
        Commands::Feedback { id, tag } => {
            let mut session = Session::open(cfg).await?;
            session.memory_mut().add_feedback(id, &tag)?;
            println!("Recorded '{}' for interaction {}.", tag, id);
            session.close().await;
        }
        Commands::Stats => {
            let session = Session::open(cfg).await?;
            print!("{}", stats::collect(session.memory()).render());
            session.close().await;
        }
        Commands::ClearMemory => {
            let mut session = Session::open(cfg).await?;
            let count = session.memory().len();
            session.memory_mut().clear()?;
            println!("Cleared {} interactions.", count);
            session.close().await;
        }
        Commands::Export { path } => {
            let session = Session::open(cfg).await?;
            session.memory().export(&path)?;
            println!(
                "Exported {} interactions to {}.",
                session.memory().len(),
                path.display()
            );
            session.close().await;
        }
    }

    Ok(())
}
