//! Fetch documents from a source and build the persisted index.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::info;

use crate::config::RagConfig;
use crate::index::{EmbedBackend, IndexStore, VectorIndex};
use crate::sources::{Document, WikiJsClient, WikipediaClient};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Wikipedia,
    Wikijs,
}

/// Where the documents of an index come from.
pub enum DocumentSource {
    Wikipedia {
        client: WikipediaClient,
        topic: String,
        limit: Option<usize>,
    },
    WikiJs(WikiJsClient),
}

impl DocumentSource {
    pub fn from_config(
        config: &RagConfig,
        source: SourceArg,
        topic: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Self> {
        match source {
            SourceArg::Wikipedia => {
                let topic = topic
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidArgument("--topic is required for the wikipedia source".into())
                    })?;
                let client = WikipediaClient::with_timeout(
                    &config.wikipedia_language,
                    config.max_articles,
                    config.request_timeout(),
                )?;
                Ok(Self::Wikipedia {
                    client,
                    topic: topic.to_string(),
                    limit,
                })
            }
            SourceArg::Wikijs => {
                let client = WikiJsClient::with_timeout(
                    &config.wiki_url,
                    config.wiki_api_key.clone(),
                    config.request_timeout(),
                )?;
                Ok(Self::WikiJs(client))
            }
        }
    }

    pub async fn fetch(&self) -> Result<Vec<Document>> {
        match self {
            DocumentSource::Wikipedia {
                client,
                topic,
                limit,
            } => Ok(client.fetch_articles_by_topic(topic, *limit).await),
            DocumentSource::WikiJs(client) => client
                .fetch_all_pages()
                .await
                .context("failed to fetch Wiki.js pages"),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Wikipedia { client, topic, .. } => {
                format!("Wikipedia ({}) topic '{}'", client.language(), topic)
            }
            DocumentSource::WikiJs(client) => format!("Wiki.js at {}", client.graphql_url()),
        }
    }
}

/// Fetch from `source` and build the index.
///
/// Returns `None` without touching the store when nothing was fetched.
pub async fn index_from(source: &DocumentSource, store: &IndexStore) -> Result<Option<VectorIndex>> {
    info!("Fetching documents from {}", source.describe());
    let documents = source.fetch().await?;

    if documents.is_empty() {
        println!("No documents found");
        return Ok(None);
    }

    println!("Fetched {} documents:", documents.len());
    for doc in &documents {
        println!("  - {}", doc.title());
    }

    let index = store
        .build(&documents)
        .await
        .context("failed to build index")?;

    println!(
        "Indexed {} documents into {} chunks ({})",
        documents.len(),
        index.len(),
        store.index_path().display()
    );

    Ok(Some(index))
}

pub async fn run(
    config: &RagConfig,
    source: SourceArg,
    topic: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let source = DocumentSource::from_config(config, source, topic, limit)?;
    let embedder = Arc::new(EmbedBackend::from_config(config)?);
    let store = IndexStore::from_config(config, embedder);

    index_from(&source, &store).await?;
    Ok(())
}
