//! Build the index from Wikipedia articles on a topic.
//!
//! Usage: build_index_wikipedia <topic> [max_articles]

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wiki_rag::commands::{self, SourceArg};
use wiki_rag::RagConfig;

#[derive(Parser)]
#[command(name = "build_index_wikipedia")]
#[command(about = "Build the RAG index from Wikipedia articles on a topic")]
struct Cli {
    /// Topic to search for on Wikipedia
    topic: String,

    /// Maximum number of articles (defaults to MAX_ARTICLES)
    max_articles: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wiki_rag=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = RagConfig::new();
    let max_articles = cli.max_articles.unwrap_or(config.max_articles);

    println!("\n{}", "=".repeat(60));
    println!("Building index from Wikipedia");
    println!("Topic: {}", cli.topic);
    println!("Max Articles: {}", max_articles);
    println!("Language: {}", config.wikipedia_language);
    println!("{}\n", "=".repeat(60));

    commands::index::run(&config, SourceArg::Wikipedia, Some(&cli.topic), Some(max_articles)).await
}
