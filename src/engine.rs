//! Conversational query pipeline.
//!
//! Each question goes through condense → retrieve → generate → stream →
//! append-history. Follow-up questions are rewritten into standalone form
//! from the most recent exchanges before they reach the index, and history is
//! only extended once a full answer is known.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RagConfig;
use crate::index::{EmbedBackend, IndexStore, QueryEngine, QueryOptions, Response, ScoredChunk};
use crate::integrations::{OllamaClient, OllamaModel};
use crate::llm::{FragmentStream, LanguageModel};
use crate::metrics::{self, AnswerMode, AnswerOutcome, CondenseOutcome};
use crate::prompts::Prompt;
use crate::{Error, Result};

/// Turns consulted when condensing a follow-up (two exchanges).
pub const CONDENSE_WINDOW: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only conversation log, extended one exchange at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatTurn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }

    /// `role: content` lines for the last `n` turns.
    pub fn render_recent(&self, n: usize) -> String {
        self.recent(n)
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn record_exchange(&mut self, question: &str, answer: &str) {
        self.turns.push(ChatTurn::user(question));
        self.turns.push(ChatTurn::assistant(answer));
    }
}

/// Condensation prompt for `question` given the recent history.
pub fn build_condense_prompt(history: &ChatHistory, question: &str) -> String {
    Prompt::CondenseQuestion.render(&[
        ("history", &history.render_recent(CONDENSE_WINDOW)),
        ("question", question),
    ])
}

/// Rewrite `question` into a standalone question.
///
/// With an empty history the question is returned unchanged and the model is
/// not called. Model errors propagate.
pub async fn condense_question(
    llm: &dyn LanguageModel,
    question: &str,
    history: &ChatHistory,
) -> Result<String> {
    if history.is_empty() {
        metrics::record_condense(CondenseOutcome::Skipped);
        return Ok(question.to_string());
    }

    let prompt = build_condense_prompt(history, question);
    let rewritten = match llm.complete(&prompt).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            metrics::record_condense(CondenseOutcome::Failed);
            return Err(e);
        }
    };

    metrics::record_condense(if is_rewrite(question, &rewritten) {
        CondenseOutcome::Rewritten
    } else {
        CondenseOutcome::Unchanged
    });
    Ok(rewritten)
}

/// The condensed form differs from what the user typed.
pub fn is_rewrite(question: &str, standalone: &str) -> bool {
    question.trim() != standalone.trim()
}

/// Chat-aware RAG pipeline over a persisted index.
pub struct ConversationalQueryEngine {
    config: RagConfig,
    store: IndexStore,
    llm: Arc<dyn LanguageModel>,
    query_engine: Option<Arc<QueryEngine>>,
    history: ChatHistory,
}

impl ConversationalQueryEngine {
    pub fn new(config: RagConfig, llm: Arc<dyn LanguageModel>, embedder: Arc<EmbedBackend>) -> Self {
        let store = IndexStore::from_config(&config, embedder);
        Self {
            config,
            store,
            llm,
            query_engine: None,
            history: ChatHistory::new(),
        }
    }

    /// Pipeline backed by Ollama and the configured embedder.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let client = OllamaClient::with_timeout(&config.ollama_base_url, config.request_timeout())?;
        let llm = OllamaModel::new(client, &config.ollama_model).into_shared();
        let embedder = Arc::new(EmbedBackend::from_config(&config)?);
        Ok(Self::new(config, llm, embedder))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn is_initialized(&self) -> bool {
        self.query_engine.is_some()
    }

    /// The bound query interface, once initialized.
    pub fn query_interface(&self) -> Option<Arc<QueryEngine>> {
        self.query_engine.clone()
    }

    /// Load the index and bind the query interface.
    ///
    /// Once this succeeds further calls return the same interface; failed
    /// attempts leave the pipeline uninitialized so the next call retries.
    pub async fn initialize(&mut self) -> Result<Arc<QueryEngine>> {
        if let Some(engine) = &self.query_engine {
            return Ok(Arc::clone(engine));
        }

        let index = self.store.load().await?;
        info!(
            "Query engine ready: {} chunks, model {}",
            index.len(),
            self.llm.model_name()
        );

        let engine = Arc::new(QueryEngine::new(
            index,
            self.store.embedder(),
            Arc::clone(&self.llm),
            QueryOptions::from_config(&self.config),
        ));
        self.query_engine = Some(Arc::clone(&engine));
        Ok(engine)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Standalone form of `question` against the current history.
    pub async fn condense(&self, question: &str) -> Result<String> {
        condense_question(self.llm.as_ref(), question, &self.history).await
    }

    async fn prepare(&mut self, question: &str) -> Result<(Arc<QueryEngine>, String)> {
        if question.trim().is_empty() {
            return Err(Error::EmptyInput("question is empty".to_string()));
        }

        let engine = self.initialize().await?;
        let standalone = self.condense(question).await?;

        if is_rewrite(question, &standalone) {
            info!("Rewritten query: {} (asked: {})", standalone, question.trim());
        } else {
            info!("Query: {}", standalone);
        }

        Ok((engine, standalone))
    }

    /// Answer `question` and record the exchange.
    pub async fn answer(&mut self, question: &str) -> Result<String> {
        Ok(self.answer_with_sources(question).await?.text)
    }

    /// Like [`answer`](Self::answer), also returning the retrieved chunks.
    pub async fn answer_with_sources(&mut self, question: &str) -> Result<Response> {
        let started = Instant::now();
        let result = self.answer_blocking(question).await;
        let outcome = if result.is_ok() {
            AnswerOutcome::Answered
        } else {
            AnswerOutcome::Failed
        };
        metrics::record_answer(AnswerMode::Blocking, outcome, started.elapsed());
        result
    }

    async fn answer_blocking(&mut self, question: &str) -> Result<Response> {
        let (engine, standalone) = self.prepare(question).await?;
        let response = engine.query(&standalone).await?;
        self.history.record_exchange(question, &response.text);
        Ok(response)
    }

    /// Stream the answer to `question`.
    ///
    /// The exchange is recorded only when the returned stream is drained to
    /// the end; abandoning or dropping it earlier leaves history untouched.
    pub async fn answer_stream(&mut self, question: &str) -> Result<AnswerStream<'_>> {
        let started = Instant::now();
        let response = match self.prepare(question).await {
            Ok((engine, standalone)) => engine
                .query_stream(&standalone)
                .await
                .map(|response| (response, standalone)),
            Err(e) => Err(e),
        };
        let (response, standalone) = match response {
            Ok(ok) => ok,
            Err(e) => {
                metrics::record_answer(AnswerMode::Stream, AnswerOutcome::Failed, started.elapsed());
                return Err(e);
            }
        };

        Ok(AnswerStream {
            fragments: response.fragments,
            sources: response.sources,
            history: &mut self.history,
            question: question.to_string(),
            standalone,
            answer: String::new(),
            state: StreamState::Streaming,
            started,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Committed,
    Failed,
}

/// Fragments of one answer; commits the exchange to history on exhaustion.
pub struct AnswerStream<'a> {
    fragments: FragmentStream,
    sources: Vec<ScoredChunk>,
    history: &'a mut ChatHistory,
    question: String,
    standalone: String,
    answer: String,
    state: StreamState,
    started: Instant,
}

impl AnswerStream<'_> {
    /// Stop early without recording the exchange.
    pub fn abandon(self) {}

    /// True once the stream was drained and the exchange recorded.
    pub fn is_committed(&self) -> bool {
        self.state == StreamState::Committed
    }

    pub fn sources(&self) -> &[ScoredChunk] {
        &self.sources
    }

    pub fn standalone_question(&self) -> &str {
        &self.standalone
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.answer
    }
}

impl Stream for AnswerStream<'_> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match this.fragments.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.answer.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.state = StreamState::Failed;
                metrics::record_answer(AnswerMode::Stream, AnswerOutcome::Failed, this.started.elapsed());
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.history.record_exchange(&this.question, &this.answer);
                this.state = StreamState::Committed;
                metrics::record_answer(AnswerMode::Stream, AnswerOutcome::Answered, this.started.elapsed());
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for AnswerStream<'_> {
    fn drop(&mut self) {
        if self.state == StreamState::Streaming {
            metrics::record_answer(AnswerMode::Stream, AnswerOutcome::Abandoned, self.started.elapsed());
        }
    }
}
