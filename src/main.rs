//! Wiki RAG CLI - main entry point
//!
//! Unified interface for indexing, asking, chatting and seeding.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use tracing::warn;
use wiki_rag::commands::{self, DemoSet, SourceArg};
use wiki_rag::metrics;

#[derive(Parser)]
#[command(name = "wiki_rag")]
#[command(about = "Conversational RAG over Wikipedia and Wiki.js", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Config file (defaults to ./config.yml, then ../config.yml)
    #[arg(short, long, env = "WIKI_RAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch documents and build the index
    Index {
        /// Document source
        #[arg(long, value_enum, default_value = "wikipedia")]
        source: SourceArg,

        /// Wikipedia search topic (required for the wikipedia source)
        #[arg(short, long)]
        topic: Option<String>,

        /// Maximum number of articles (defaults to MAX_ARTICLES)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Ask a single question
    Ask {
        question: String,

        /// Print the answer as it is generated
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Show the retrieved passages
        #[arg(long, default_value_t = false)]
        sources: bool,
    },

    /// Interactive chat with follow-up questions
    Chat,

    /// Create sample pages in Wiki.js
    Seed {
        /// YAML file with pages (overrides --demo)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Built-in page set
        #[arg(long, value_enum, default_value = "projects")]
        demo: DemoSet,
    },

    /// Show Ollama, model and index status
    Status {
        /// Download configured models that are missing
        #[arg(long, default_value_t = false)]
        pull: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Index { .. } => "index",
            Commands::Ask { .. } => "ask",
            Commands::Chat => "chat",
            Commands::Seed { .. } => "seed",
            Commands::Status { .. } => "status",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wiki_rag=info".parse()?))
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.config, cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    if let Err(err) = &result {
        if let Some(hint) = commands::error_hint(err) {
            eprintln!("\n[X] {}\n", hint);
        }
    }

    result
}

async fn execute_command(config_path: Option<PathBuf>, command: Commands) -> anyhow::Result<()> {
    let config = commands::load_config(config_path.as_deref())?;

    match command {
        Commands::Index {
            source,
            topic,
            limit,
        } => {
            commands::index::run(&config, source, topic.as_deref(), limit).await?;
        }
        Commands::Ask {
            question,
            stream,
            sources,
        } => {
            commands::ask::run(config, &question, stream, sources).await?;
        }
        Commands::Chat => {
            commands::chat::run(config).await?;
        }
        Commands::Seed { file, demo } => {
            commands::seed::run(&config, file.as_deref(), demo).await?;
        }
        Commands::Status { pull } => {
            commands::status::run(&config, pull).await?;
        }
    }

    Ok(())
}
