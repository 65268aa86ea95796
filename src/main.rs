//! # Syllabus CLI
//!
//! ```bash
//! syllabus --config ./config/syllabus.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `syllabus init` | Create the index database and run schema migrations |
//! | `syllabus ingest` | Rebuild the vector index from the document directory |
//! | `syllabus retrieve "<query>"` | Print the retrieved context block and sources |
//! | `syllabus chat "<question>"` | Answer one question and print the JSON response |
//! | `syllabus serve` | Start the HTTP chat server |
//!
//! Logs go to stderr (`RUST_LOG`, default `syllabus=info`); command output
//! goes to stdout.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use syllabus::assistant::Assistant;
use syllabus::config;
use syllabus::models::ChatRequest;
use syllabus::{ingest, migrate, server};

/// Syllabus: a retrieval-augmented study assistant backend.
#[derive(Parser)]
#[command(
    name = "syllabus",
    about = "Syllabus: a retrieval-augmented study assistant backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/syllabus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database schema. Idempotent.
    Init,

    /// Rebuild the vector index from the document directory.
    ///
    /// This is destructive: the existing index is cleared first. If no
    /// document yields any text, the index is left untouched.
    Ingest {
        /// Show file, page, chunk and batch counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the context block and sources retrieved for a query.
    Retrieve {
        query: String,
    },

    /// Answer a single question and print the JSON response.
    Chat {
        question: String,

        /// Conversation history passed to the model verbatim.
        #[arg(long, default_value = "")]
        history: String,

        /// Image file to attach.
        #[arg(long)]
        image: Option<PathBuf>,

        /// RAG flag (`false`, `0`, `null`, `none` or empty disable retrieval).
        #[arg(long, default_value = "true")]
        rag: String,
    },

    /// Start the HTTP chat server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("syllabus=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index database initialized at {}", cfg.index.path.display());
        }
        Commands::Ingest { dry_run } => {
            ingest::run_ingest(&cfg, dry_run).await?;
        }
        Commands::Retrieve { query } => {
            let assistant = Assistant::from_config(&cfg).await?;
            let retrieval = assistant.retrieve(&query).await;
            if retrieval.is_empty() {
                println!("No matching context.");
            } else {
                println!("{}", retrieval.context);
                println!();
                println!("sources: {}", retrieval.sources.join(", "));
            }
        }
        Commands::Chat {
            question,
            history,
            image,
            rag,
        } => {
            let image = match image {
                Some(path) => Some(
                    std::fs::read(&path)
                        .with_context(|| format!("Failed to read image: {}", path.display()))?,
                ),
                None => None,
            };
            let assistant = Assistant::from_config(&cfg).await?;
            let response = assistant
                .ask(ChatRequest {
                    question,
                    history,
                    image,
                    use_rag: rag,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
