//! Configuration for the RAG pipeline
//!
//! Values come from `config.yml` (optional), then `.env`, then the process
//! environment. A YAML value written as `${VAR}` is taken from `VAR`; any
//! explicitly set environment variable wins over the YAML file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::index::ResponseMode;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral";
pub const DEFAULT_STORAGE_DIR: &str = "./storage";
pub const DEFAULT_WIKIPEDIA_LANGUAGE: &str = "en";
pub const DEFAULT_MAX_ARTICLES: usize = 10;
pub const DEFAULT_WIKI_URL: &str = "http://localhost:3000";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 48;
pub const DEFAULT_CONTEXT_WINDOW_CHARS: usize = 12_000;
pub const DEFAULT_LOCAL_EMBEDDING_DIM: usize = 256;

/// Which service turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Ollama,
    OpenAI,
    Local,
}

impl FromStr for EmbeddingProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "ollama" => Ok(EmbeddingProvider::Ollama),
            "openai" => Ok(EmbeddingProvider::OpenAI),
            "local" | "hash" => Ok(EmbeddingProvider::Local),
            other => Err(Error::Config(format!(
                "unknown embedding provider '{}' (expected ollama | openai | local)",
                other
            ))),
        }
    }
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    ollama: Option<OllamaSection>,
    storage: Option<StorageSection>,
    wikipedia: Option<WikipediaSection>,
    wiki: Option<WikiSection>,
    embedding: Option<EmbeddingSection>,
    retrieval: Option<RetrievalSection>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaSection {
    base_url: Option<String>,
    model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    request_timeout_secs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WikipediaSection {
    language: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    max_articles: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WikiSection {
    url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingSection {
    provider: Option<String>,
    model: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    dimension: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    batch_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalSection {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    similarity_top_k: Option<String>,
    response_mode: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    chunk_size: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    chunk_overlap: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    context_window_chars: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Main configuration struct, passed explicitly to every component.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub request_timeout_secs: u64,
    pub storage_dir: PathBuf,
    pub wikipedia_language: String,
    pub max_articles: usize,
    pub wiki_url: String,
    pub wiki_api_key: Option<String>,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub embed_batch_size: usize,
    pub similarity_top_k: usize,
    pub response_mode: ResponseMode,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub context_window_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RagConfig {
    /// Load configuration from config.yml or fall back to environment + defaults.
    pub fn new() -> Self {
        Self::load_from_file("config.yml")
            .or_else(|_| Self::load_from_file("../config.yml"))
            .or_else(|_| Self::from_env())
            .unwrap_or_else(|_| Self::defaults())
    }

    /// Configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load_dotenv();
        Self::from_yaml(YamlConfig::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::load_from_str(&content)
    }

    /// Parse configuration from YAML text (environment still applies).
    pub fn load_from_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Self::from_yaml(yaml)
    }

    fn from_yaml(yaml: YamlConfig) -> Result<Self> {
        let ollama = yaml.ollama.unwrap_or_default();
        let storage = yaml.storage.unwrap_or_default();
        let wikipedia = yaml.wikipedia.unwrap_or_default();
        let wiki = yaml.wiki.unwrap_or_default();
        let embedding = yaml.embedding.unwrap_or_default();
        let retrieval = yaml.retrieval.unwrap_or_default();

        let wiki_api_key = Self::resolve_env_string(wiki.api_key, "WIKI_API_KEY");
        let response_mode = Self::resolve_env_string(retrieval.response_mode, "RESPONSE_MODE");

        let config = Self {
            ollama_base_url: Self::resolve_env_string(ollama.base_url, "OLLAMA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            ollama_model: Self::resolve_env_string(ollama.model, "OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            request_timeout_secs: Self::resolve_env_parsed(
                ollama.request_timeout_secs,
                "OLLAMA_REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            storage_dir: PathBuf::from(
                Self::resolve_env_string(storage.dir, "STORAGE_DIR")
                    .unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string()),
            ),
            wikipedia_language: Self::resolve_env_string(wikipedia.language, "WIKIPEDIA_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_WIKIPEDIA_LANGUAGE.to_string()),
            max_articles: Self::resolve_env_parsed(
                wikipedia.max_articles,
                "MAX_ARTICLES",
                DEFAULT_MAX_ARTICLES,
            )?,
            wiki_url: Self::resolve_env_string(wiki.url, "WIKI_URL")
                .unwrap_or_else(|| DEFAULT_WIKI_URL.to_string()),
            wiki_api_key: wiki_api_key.filter(|k| !k.trim().is_empty()),
            embedding_provider: Self::resolve_env_parsed(
                embedding.provider,
                "EMBEDDING_PROVIDER",
                EmbeddingProvider::Ollama,
            )?,
            embedding_model: Self::resolve_env_string(embedding.model, "EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dim: Self::resolve_env_parsed(
                embedding.dimension,
                "EMBEDDING_DIM",
                DEFAULT_LOCAL_EMBEDDING_DIM,
            )?,
            embed_batch_size: Self::resolve_env_parsed(
                embedding.batch_size,
                "EMBED_BATCH_SIZE",
                DEFAULT_EMBED_BATCH_SIZE,
            )?,
            similarity_top_k: Self::resolve_env_parsed(
                retrieval.similarity_top_k,
                "SIMILARITY_TOP_K",
                DEFAULT_TOP_K,
            )?,
            response_mode: match response_mode {
                Some(mode) => mode.parse()?,
                None => ResponseMode::TreeSummarize,
            },
            chunk_size: Self::resolve_env_parsed(
                retrieval.chunk_size,
                "CHUNK_SIZE",
                DEFAULT_CHUNK_SIZE,
            )?,
            chunk_overlap: Self::resolve_env_parsed(
                retrieval.chunk_overlap,
                "CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            context_window_chars: Self::resolve_env_parsed(
                retrieval.context_window_chars,
                "CONTEXT_WINDOW_CHARS",
                DEFAULT_CONTEXT_WINDOW_CHARS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults without consulting the environment.
    pub fn defaults() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            wikipedia_language: DEFAULT_WIKIPEDIA_LANGUAGE.to_string(),
            max_articles: DEFAULT_MAX_ARTICLES,
            wiki_url: DEFAULT_WIKI_URL.to_string(),
            wiki_api_key: None,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_LOCAL_EMBEDDING_DIM,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            similarity_top_k: DEFAULT_TOP_K,
            response_mode: ResponseMode::TreeSummarize,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            context_window_chars: DEFAULT_CONTEXT_WINDOW_CHARS,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.similarity_top_k == 0 {
            return Err(Error::Config("similarity_top_k must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.context_window_chars < 256 {
            return Err(Error::Config(
                "context_window_chars must be at least 256".into(),
            ));
        }
        Ok(())
    }

    /// Path of the persisted index file.
    pub fn index_path(&self) -> PathBuf {
        self.storage_dir.join(crate::index::INDEX_FILE)
    }

    /// Per-request timeout shared by every HTTP backend.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve a value: `${VAR}` placeholders and explicit env vars win over YAML.
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                return std::env::var(var_name).ok();
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        value
    }

    fn resolve_env_parsed<T>(value: Option<String>, env_key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match Self::resolve_env_string(value, env_key) {
            Some(raw) => raw.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("invalid value '{}' for {}: {}", raw, env_key, e))
            }),
            None => Ok(default),
        }
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }
}
