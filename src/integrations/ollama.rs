//! Ollama client for local LLM inference and embeddings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::{FragmentStream, LanguageModel};
use crate::{Error, Result};

const OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Ollama HTTP client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create client with the default URL.
    pub fn new() -> Result<Self> {
        Self::with_url(OLLAMA_URL)
    }

    /// Create client with custom URL.
    pub fn with_url(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create client with custom URL and request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::BackendUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama server is running.
    pub async fn is_running(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// List available models.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Ollama request failed: {}", e)))?;

        let response = check_status(response).await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("Invalid response: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Generate text in one response.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String> {
        let response = self
            .send_generate(prompt, model, system, temperature, false)
            .await?;

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("Invalid response: {}", e)))?;

        Ok(result.response)
    }

    /// Generate text as a stream of fragments (`stream: true`, NDJSON body).
    ///
    /// Resolves once the response headers arrive; each pull of the returned
    /// stream waits for the next generated fragment.
    pub async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<FragmentStream> {
        let response = self
            .send_generate(prompt, model, system, temperature, true)
            .await?;

        Ok(ndjson_fragments(response.bytes_stream()))
    }

    async fn send_generate(
        &self,
        prompt: &str,
        model: &str,
        system: Option<&str>,
        temperature: f32,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            system: system.map(|s| s.to_string()),
            stream,
            options: GenerateOptions { temperature },
        };

        debug!(model, stream, prompt_len = prompt.len(), "Ollama generate");

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Ollama request failed: {}", e)))?;

        check_status(response).await
    }

    /// Embed a batch of texts with an embedding model.
    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: model.to_string(),
            input: inputs.to_vec(),
        };

        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Ollama request failed: {}", e)))?;

        let response = check_status(response).await?;
        let result: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("Invalid response: {}", e)))?;

        if result.embeddings.len() != inputs.len() {
            return Err(Error::MalformedResponse(format!(
                "Ollama returned {} embeddings for {} inputs",
                result.embeddings.len(),
                inputs.len()
            )));
        }

        Ok(result.embeddings)
    }

    /// Pull (download) a model.
    pub async fn pull_model(&self, model: &str) -> Result<bool> {
        info!("Downloading {}...", model);

        let request = PullRequest {
            name: model.to_string(),
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/api/pull", self.base_url))
            .json(&request)
            .timeout(Duration::from_secs(3600)) // 1 hour for large models
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Ollama pull failed: {}", e)))?;

        Ok(response.status().is_success())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(Error::BackendUnavailable(format!(
        "Ollama error {}: {}",
        status, text
    )))
}

/// Turn an NDJSON byte stream of generate chunks into text fragments.
fn ndjson_fragments<S, B>(bytes: S) -> FragmentStream
where
    S: futures::Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]>,
{
    let state = NdjsonState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        done: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if state.done {
                return Ok(None);
            }

            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                match parse_stream_line(&line)? {
                    Some(chunk) => {
                        state.done = chunk.done;
                        if !chunk.response.is_empty() {
                            return Ok(Some((chunk.response, state)));
                        }
                    }
                    None => continue,
                }
                continue;
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    return Err(Error::BackendUnavailable(format!(
                        "Ollama stream interrupted: {}",
                        e
                    )))
                }
                None => {
                    state.done = true;
                    let rest = std::mem::take(&mut state.buffer);
                    if let Some(chunk) = parse_stream_line(&rest)? {
                        if !chunk.response.is_empty() {
                            return Ok(Some((chunk.response, state)));
                        }
                    }
                    return Ok(None);
                }
            }
        }
    })
    .boxed()
}

struct NdjsonState<S> {
    bytes: std::pin::Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

fn parse_stream_line(line: &[u8]) -> Result<Option<GenerateStreamChunk>> {
    let text = std::str::from_utf8(line)
        .map_err(|e| Error::MalformedResponse(format!("Invalid UTF-8 in stream: {}", e)))?
        .trim();

    if text.is_empty() {
        return Ok(None);
    }

    let chunk: GenerateStreamChunk = serde_json::from_str(text)
        .map_err(|e| Error::MalformedResponse(format!("Invalid stream chunk '{}': {}", text, e)))?;

    if let Some(error) = chunk.error {
        return Err(Error::BackendUnavailable(format!("Ollama error: {}", error)));
    }

    Ok(Some(chunk))
}

/// A model served by Ollama, usable wherever a [`LanguageModel`] is expected.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
    temperature: f32,
}

impl OllamaModel {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Shared handle for the pipeline and query engine.
    pub fn into_shared(self) -> Arc<dyn LanguageModel> {
        Arc::new(self)
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.client
            .generate(prompt, &self.model, None, self.temperature)
            .await
    }

    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.client
            .generate_stream(prompt, &self.model, None, self.temperature)
            .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct GenerateStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct PullRequest {
    name: String,
    stream: bool,
}

/// Recommended models.
pub const RECOMMENDED_MODELS: &[(&str, &str)] = &[
    ("mistral", "7B, default answer model"),
    ("llama3.1:8b", "4.7GB, stronger answers"),
    ("nomic-embed-text", "embeddings"),
];
