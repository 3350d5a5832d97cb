//! Seed a Wiki.js instance with sample pages.
//!
//! Usage: seed_wiki [wiki_url] [api_key] [--demo projects|mission] [--file pages.yml]

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wiki_rag::commands::{self, DemoSet};
use wiki_rag::RagConfig;

#[derive(Parser)]
#[command(name = "seed_wiki")]
#[command(about = "Create sample pages in Wiki.js")]
struct Cli {
    /// Wiki.js base URL (defaults to WIKI_URL)
    url: Option<String>,

    /// API key (defaults to WIKI_API_KEY)
    api_key: Option<String>,

    /// Built-in page set
    #[arg(long, value_enum, default_value = "projects")]
    demo: DemoSet,

    /// YAML file with pages (overrides --demo)
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wiki_rag=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = RagConfig::new();
    if let Some(url) = cli.url {
        config.wiki_url = url.trim_end_matches("/graphql").to_string();
    }
    if let Some(key) = cli.api_key {
        config.wiki_api_key = Some(key);
    }

    let report = commands::seed::run(&config, cli.file.as_deref(), cli.demo).await?;
    if report.created.is_empty() && !report.failed.is_empty() {
        anyhow::bail!("no pages were created");
    }
    Ok(())
}
