//! Conversational RAG over Wikipedia and Wiki.js
//!
//! This library provides tools to:
//! - Fetch articles from Wikipedia and pages from a Wiki.js instance
//! - Chunk, embed and persist them as a searchable vector index
//! - Answer questions over the index with a local Ollama model
//! - Keep a chat history and rewrite follow-up questions before retrieval
//! - Stream answers fragment by fragment
//! - Seed Wiki.js with sample content

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod integrations;
pub mod llm;
pub mod metrics;
pub mod prompts;
pub mod sources;

// Re-export common types
pub use config::{EmbeddingProvider, RagConfig};
pub use engine::{AnswerStream, ChatHistory, ChatRole, ChatTurn, ConversationalQueryEngine};
pub use error::{Error, Result};
pub use index::{EmbedBackend, IndexStore, QueryEngine, ResponseMode, VectorIndex};
pub use integrations::{OllamaClient, OllamaModel};
pub use llm::{FragmentStream, LanguageModel};
pub use prompts::{load_prompt, Prompt};
pub use sources::{Document, SourceKind, WikiJsClient, WikipediaClient};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
