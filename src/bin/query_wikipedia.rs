//! Interactive chat over the index built by `build_index_wikipedia`.

use tracing_subscriber::EnvFilter;

use wiki_rag::commands;
use wiki_rag::RagConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wiki_rag=warn".parse()?))
        .init();

    let result = commands::chat::run(RagConfig::new()).await;

    if let Err(err) = &result {
        if let Some(hint) = commands::error_hint(err) {
            eprintln!("\n[X] {}", hint);
            eprintln!("  or: build_index_wikipedia \"Machine Learning\" 10\n");
        }
    }

    result
}
