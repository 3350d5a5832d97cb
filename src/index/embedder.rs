//! Embedding backends.

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EmbeddingProvider, RagConfig};
use crate::integrations::OllamaClient;
use crate::{Error, Result};

const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
/// Recorded in index manifests; bump it whenever token bucketing changes.
const LOCAL_MODEL: &str = "hashed-bow-fnv1a";
const OPENAI_MAX_INPUT_CHARS: usize = 8000;

/// Identifies the embedder an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderInfo {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl std::fmt::Display for EmbedderInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)?;
        if let Some(dim) = self.dimension {
            write!(f, " ({} dims)", dim)?;
        }
        Ok(())
    }
}

#[allow(clippy::large_enum_variant)]
pub enum EmbedBackend {
    Ollama { client: OllamaClient, model: String },
    OpenAI(EmbeddingService),
    Local(LocalEmbedder),
}

impl EmbedBackend {
    /// Backend selected by `embedding_provider`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        match config.embedding_provider {
            EmbeddingProvider::Ollama => {
                let client = OllamaClient::with_timeout(
                    &config.ollama_base_url,
                    std::time::Duration::from_secs(config.request_timeout_secs),
                )?;
                Ok(Self::ollama(client, &config.embedding_model))
            }
            EmbeddingProvider::OpenAI => {
                let model = if config.embedding_model == crate::config::DEFAULT_EMBEDDING_MODEL {
                    OPENAI_DEFAULT_MODEL
                } else {
                    config.embedding_model.as_str()
                };
                Ok(EmbedBackend::OpenAI(EmbeddingService::with_model(model)?))
            }
            EmbeddingProvider::Local => Ok(Self::local(config.embedding_dim)),
        }
    }

    pub fn ollama(client: OllamaClient, model: &str) -> Self {
        EmbedBackend::Ollama {
            client,
            model: model.to_string(),
        }
    }

    pub fn local(dim: usize) -> Self {
        EmbedBackend::Local(LocalEmbedder::new(dim))
    }

    /// Embed a batch; one vector per input, in order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbedBackend::Ollama { client, model } => client.embed(model, texts).await,
            EmbedBackend::OpenAI(service) => service.embed_batch(texts).await,
            EmbedBackend::Local(local) => Ok(texts.iter().map(|t| local.embed(t)).collect()),
        }
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedResponse("No embedding returned".to_string()))
    }

    pub fn info(&self) -> EmbedderInfo {
        match self {
            EmbedBackend::Ollama { model, .. } => EmbedderInfo {
                provider: "ollama".to_string(),
                model: model.clone(),
                dimension: None,
            },
            EmbedBackend::OpenAI(service) => EmbedderInfo {
                provider: "openai".to_string(),
                model: service.model().to_string(),
                dimension: Some(service.dimension()),
            },
            EmbedBackend::Local(local) => EmbedderInfo {
                provider: "local".to_string(),
                model: LOCAL_MODEL.to_string(),
                dimension: Some(local.dimension()),
            },
        }
    }
}

/// Deterministic, fast embedding for offline/local use.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let idx = (fnv1a_64(token.as_bytes()) % self.dim as u64) as usize;
            vec[idx] += 1.0;
        }

        normalize(&mut vec);
        vec
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }
}

/// 64-bit FNV-1a. Fixed across Rust releases and platforms, so persisted
/// local indexes stay valid.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

/// OpenAI embeddings via async-openai.
pub struct EmbeddingService {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl EmbeddingService {
    /// Create a new embedding service (`OPENAI_API_KEY` required).
    pub fn new() -> Result<Self> {
        Self::with_model(OPENAI_DEFAULT_MODEL)
    }

    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY not set".to_string()))?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            config = config.with_api_base(base);
        }

        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate embeddings for multiple texts in batch.
    ///
    /// Blank inputs get an empty vector so output indices match input indices.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let processed: Vec<String> = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().take(OPENAI_MAX_INPUT_CHARS).collect())
            .collect();

        if processed.is_empty() {
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed))
            .build()
            .map_err(|e| Error::InvalidArgument(format!("Invalid embedding request: {}", e)))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("OpenAI embeddings failed: {}", e)))?;

        info!(
            "Generated {} embeddings, tokens used: {}",
            response.data.len(),
            response.usage.total_tokens
        );

        let mut result = Vec::with_capacity(texts.len());
        let mut embed_iter = response.data.into_iter();

        for text in texts {
            if text.trim().is_empty() {
                result.push(Vec::new());
            } else if let Some(embed) = embed_iter.next() {
                result.push(embed.embedding);
            } else {
                return Err(Error::MalformedResponse(
                    "OpenAI returned fewer embeddings than inputs".to_string(),
                ));
            }
        }

        Ok(result)
    }

    /// Embedding dimension of the current model.
    pub fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
