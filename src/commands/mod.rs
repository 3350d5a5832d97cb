//! Command implementations
//!
//! Each module corresponds to a subcommand of the `wiki_rag` CLI. The
//! standalone binaries call into the same functions.

pub mod ask;
pub mod chat;
pub mod index;
pub mod seed;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::RagConfig;
use crate::index::ScoredChunk;
use crate::Error;

pub use ask::run as ask_run;
pub use chat::{parse_input, run as chat_run, ChatInput};
pub use index::{run as index_run, DocumentSource, SourceArg};
pub use seed::{run as seed_run, DemoSet, SeedReport};
pub use status::{run as status_run, StatusReport};

pub const BUILD_INDEX_HINT: &str = "No index found! Build the index first:\n  \
wiki_rag index --source wikipedia --topic \"Machine Learning\" --limit 10";

/// Configuration from `path` if given, otherwise from `config.yml` and the
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    match path {
        Some(path) => RagConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(RagConfig::new()),
    }
}

/// Actionable advice for errors the user can fix.
pub fn error_hint(err: &anyhow::Error) -> Option<&'static str> {
    match err.downcast_ref::<Error>()? {
        Error::IndexNotFound(_) => Some(BUILD_INDEX_HINT),
        Error::InvalidIndex(_) => Some("The stored index is unusable. Rebuild it with `wiki_rag index`."),
        Error::IndexLocked => Some("Another process is writing the index. Try again when it finishes."),
        Error::BackendUnavailable(message) => Some(backend_hint(message)),
        _ => None,
    }
}

/// Advice for the backend named in a `BackendUnavailable` message.
fn backend_hint(message: &str) -> &'static str {
    if message.contains("Wiki.js") {
        "Check that Wiki.js is reachable at WIKI_URL and that WIKI_API_KEY is valid."
    } else if message.contains("Wikipedia") {
        "Check your network connection and WIKIPEDIA_LANGUAGE; Wikipedia could not be reached."
    } else if message.contains("OpenAI") {
        "Check OPENAI_API_KEY and OPENAI_BASE_URL, or switch EMBEDDING_PROVIDER."
    } else if message.contains("Ollama") {
        "Check that Ollama is running (`ollama serve`) and OLLAMA_BASE_URL is correct."
    } else {
        "A backend service could not be reached; check the configured URLs."
    }
}

/// Print retrieved chunks, best first.
pub fn print_sources(sources: &[ScoredChunk]) {
    if sources.is_empty() {
        return;
    }

    println!("\nSources:");
    for (idx, source) in sources.iter().enumerate() {
        println!(
            "{}. {} (score: {:.3})",
            idx + 1,
            source.chunk.source,
            source.score
        );
        if let Some(url) = &source.url {
            println!("   {}", url);
        }
        println!("   {}", truncate(&source.chunk.text.replace('\n', " "), 160));
    }
}

/// Shorten `s` to at most `max_chars` characters.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_index_gets_build_hint() {
        let err = anyhow::Error::new(Error::IndexNotFound("./storage".into()));
        assert_eq!(error_hint(&err), Some(BUILD_INDEX_HINT));

        let wrapped = Err::<(), _>(Error::IndexNotFound("./storage".into()))
            .context("chat failed")
            .unwrap_err();
        assert_eq!(error_hint(&wrapped), Some(BUILD_INDEX_HINT));
    }

    #[test]
    fn other_errors_have_no_hint() {
        let err = anyhow::Error::new(Error::EmptyInput("question is empty".into()));
        assert_eq!(error_hint(&err), None);
        assert_eq!(error_hint(&anyhow::anyhow!("plain")), None);
    }

    #[test]
    fn backend_hint_names_the_failing_service() {
        let hint = |message: &str| {
            error_hint(&anyhow::Error::new(Error::BackendUnavailable(message.into())))
        };

        assert!(hint("Wiki.js request failed: timed out").unwrap().contains("WIKI_URL"));
        assert!(hint("Wikipedia returned HTTP 503: busy").unwrap().contains("Wikipedia"));
        assert!(hint("Ollama request failed: connection refused").unwrap().contains("ollama serve"));
        assert!(hint("OpenAI embeddings failed: 401").unwrap().contains("OPENAI_API_KEY"));
        assert!(!hint("connection reset").unwrap().contains("Ollama"));

        let wrapped = Err::<(), _>(Error::BackendUnavailable("Wiki.js returned HTTP 502: bad".into()))
            .context("failed to fetch Wiki.js pages")
            .unwrap_err();
        assert!(!error_hint(&wrapped).unwrap().contains("Ollama"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/config.yml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.yml"));
    }
}
