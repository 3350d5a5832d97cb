//! Health overview: Ollama, installed models, persisted index.

use anyhow::Result;
use tracing::warn;

use crate::config::{EmbeddingProvider, RagConfig};
use crate::index::{read_manifest, IndexManifest};
use crate::integrations::ollama::RECOMMENDED_MODELS;
use crate::integrations::OllamaClient;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub ollama_url: String,
    pub ollama_running: bool,
    pub models: Vec<String>,
    /// Configured models Ollama does not have.
    pub missing_models: Vec<String>,
    pub index: Option<IndexManifest>,
    /// Why the index could not be read, other than it not existing.
    pub index_problem: Option<String>,
}

/// `name` is installed, either exactly or as its `:latest` tag.
pub fn has_model(installed: &[String], name: &str) -> bool {
    installed.iter().any(|model| {
        model == name || (!name.contains(':') && model.split(':').next() == Some(name))
    })
}

/// Models the configuration needs from Ollama.
pub fn required_models(config: &RagConfig) -> Vec<String> {
    let mut models = vec![config.ollama_model.clone()];
    if config.embedding_provider == EmbeddingProvider::Ollama
        && config.embedding_model != config.ollama_model
    {
        models.push(config.embedding_model.clone());
    }
    models
}

pub async fn collect(config: &RagConfig, client: &OllamaClient) -> StatusReport {
    let ollama_running = client.is_running().await;

    let models = if ollama_running {
        client.list_models().await.unwrap_or_else(|e| {
            warn!("Could not list Ollama models: {}", e);
            Vec::new()
        })
    } else {
        Vec::new()
    };

    let missing_models = required_models(config)
        .into_iter()
        .filter(|name| !has_model(&models, name))
        .collect();

    let (index, index_problem) = match read_manifest(&config.storage_dir) {
        Ok(manifest) => (Some(manifest), None),
        Err(e) if e.is_not_found() => (None, None),
        Err(e) => (None, Some(e.to_string())),
    };

    StatusReport {
        ollama_url: client.base_url().to_string(),
        ollama_running,
        models,
        missing_models,
        index,
        index_problem,
    }
}

pub fn print_report(report: &StatusReport) {
    println!("=== Wiki RAG status ===\n");

    if report.ollama_running {
        println!("Ollama: running at {}", report.ollama_url);
        if report.models.is_empty() {
            println!("Models: none installed");
        } else {
            println!("Models:");
            for model in &report.models {
                println!("  - {}", model);
            }
        }
    } else {
        println!("Ollama: not reachable at {}", report.ollama_url);
        println!("  Start it with: ollama serve");
    }

    if !report.missing_models.is_empty() {
        println!("\nMissing models: {}", report.missing_models.join(", "));
        println!("  Install with: wiki_rag status --pull");
        println!("  Recommended:");
        for (name, note) in RECOMMENDED_MODELS {
            println!("    {:<18} {}", name, note);
        }
    }

    println!();
    match (&report.index, &report.index_problem) {
        (Some(manifest), _) => {
            println!("Index: {} documents, {} chunks", manifest.document_count, manifest.chunk_count);
            println!("  built:    {}", manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("  embedder: {}", manifest.embedder);
            println!(
                "  chunking: {} chars, {} overlap",
                manifest.chunk_size, manifest.chunk_overlap
            );
        }
        (None, Some(problem)) => println!("Index: unusable ({})", problem),
        (None, None) => println!("Index: not built yet"),
    }
}

pub async fn run(config: &RagConfig, pull: bool) -> Result<StatusReport> {
    let client = OllamaClient::with_timeout(&config.ollama_base_url, config.request_timeout())?;
    let mut report = collect(config, &client).await;
    print_report(&report);

    if !pull || report.missing_models.is_empty() {
        return Ok(report);
    }
    if !report.ollama_running {
        println!("\nCannot pull models: Ollama is not running");
        return Ok(report);
    }

    for model in report.missing_models.clone() {
        println!("\nPulling {} (this can take a while)...", model);
        if client.pull_model(&model).await? {
            println!("Pulled {}", model);
            report.missing_models.retain(|m| m != &model);
        } else {
            println!("Failed to pull {}", model);
        }
    }

    Ok(report)
}
