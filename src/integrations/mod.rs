//! External integrations.

pub mod ollama;

pub use ollama::{OllamaClient, OllamaModel};
