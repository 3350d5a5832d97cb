//! Tests for status command

use wiki_rag::commands::status::{has_model, required_models};
use wiki_rag::config::{EmbeddingProvider, RagConfig};

#[test]
fn test_status_model_tags() {
    let installed = vec!["nomic-embed-text:latest".to_string()];
    assert!(has_model(&installed, "nomic-embed-text"));
    assert!(!has_model(&installed, "mistral"));
}

#[test]
fn test_status_openai_embeddings_need_no_ollama_model() {
    let mut config = RagConfig::defaults();
    config.embedding_provider = EmbeddingProvider::OpenAI;
    assert_eq!(required_models(&config), vec!["mistral".to_string()]);
}
