//! Retrieval + answer synthesis over a loaded [`VectorIndex`].

use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt};
use tracing::debug;

use super::embedder::EmbedBackend;
use super::store::{ScoredChunk, VectorIndex};
use super::ResponseMode;
use crate::config::RagConfig;
use crate::llm::{FragmentStream, LanguageModel};
use crate::metrics;
use crate::prompts::Prompt;
use crate::Result;

/// Answer returned when retrieval finds nothing.
pub const EMPTY_RESPONSE: &str = "Empty Response";

const PACK_SEPARATOR: &str = "\n\n";
const MIN_PACK_CHARS: usize = 64;
/// Smallest slice of a summary worth keeping in a squeezed pack.
const MIN_SHARE_CHARS: usize = 16;
/// Summarization rounds before the remaining texts are squeezed into one pack.
const MAX_TREE_ROUNDS: usize = 4;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub response_mode: ResponseMode,
    pub context_window_chars: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: crate::config::DEFAULT_TOP_K,
            response_mode: ResponseMode::TreeSummarize,
            context_window_chars: crate::config::DEFAULT_CONTEXT_WINDOW_CHARS,
        }
    }
}

impl QueryOptions {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            top_k: config.similarity_top_k,
            response_mode: config.response_mode,
            context_window_chars: config.context_window_chars,
        }
    }
}

/// Complete answer with the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

/// Incremental answer with the chunks it is grounded on.
pub struct StreamingResponse {
    pub fragments: FragmentStream,
    pub sources: Vec<ScoredChunk>,
}

enum Synthesis {
    Text(String),
    Stream(FragmentStream),
}

/// Query interface bound to one loaded index.
pub struct QueryEngine {
    index: VectorIndex,
    embedder: Arc<EmbedBackend>,
    llm: Arc<dyn LanguageModel>,
    options: QueryOptions,
}

impl QueryEngine {
    pub fn new(
        index: VectorIndex,
        embedder: Arc<EmbedBackend>,
        llm: Arc<dyn LanguageModel>,
        options: QueryOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            options,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Top-k chunks for `text`.
    pub async fn retrieve(&self, text: &str) -> Result<Vec<ScoredChunk>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let embedding = self.embedder.embed_query(text).await?;
        let hits = self.index.search(&embedding, self.options.top_k);
        metrics::record_retrieval(started.elapsed());
        debug!(query = text, hits = hits.len(), "Retrieved chunks");
        Ok(hits)
    }

    pub async fn query(&self, text: &str) -> Result<Response> {
        let sources = self.retrieve(text).await?;
        let text = match self.synthesize(text, &sources, false).await? {
            Synthesis::Text(text) => text,
            Synthesis::Stream(fragments) => collect_fragments(fragments).await?,
        };
        Ok(Response { text, sources })
    }

    /// Like [`query`](Self::query), but the final generation is streamed.
    pub async fn query_stream(&self, text: &str) -> Result<StreamingResponse> {
        let sources = self.retrieve(text).await?;
        let fragments = match self.synthesize(text, &sources, true).await? {
            Synthesis::Stream(fragments) => fragments,
            Synthesis::Text(text) => stream::once(async move { Ok(text) }).boxed(),
        };
        Ok(StreamingResponse { fragments, sources })
    }

    async fn synthesize(
        &self,
        query: &str,
        sources: &[ScoredChunk],
        streaming: bool,
    ) -> Result<Synthesis> {
        if sources.is_empty() {
            return Ok(Synthesis::Text(EMPTY_RESPONSE.to_string()));
        }

        let texts: Vec<String> = sources.iter().map(|s| s.chunk.text.clone()).collect();

        match self.options.response_mode {
            ResponseMode::TreeSummarize => self.tree_summarize(query, texts, streaming).await,
            ResponseMode::Compact => self.compact(query, texts, streaming).await,
        }
    }

    async fn tree_summarize(
        &self,
        query: &str,
        mut texts: Vec<String>,
        streaming: bool,
    ) -> Result<Synthesis> {
        let budget = self.pack_budget(Prompt::TreeSummarize, query);

        for round in 0.. {
            let packs = pack_texts(&texts, budget);
            if packs.len() == 1 {
                let prompt = render_qa(Prompt::TreeSummarize, &packs[0], query);
                return self.generate(&prompt, streaming).await;
            }
            if round == MAX_TREE_ROUNDS {
                debug!(texts = texts.len(), "Summary rounds exhausted, squeezing into one pack");
                break;
            }

            debug!(round, packs = packs.len(), "Summarizing packs");
            let mut summaries = Vec::with_capacity(packs.len());
            for pack in &packs {
                let prompt = render_qa(Prompt::TreeSummarize, pack, query);
                summaries.push(self.llm.complete(&prompt).await?.trim().to_string());
            }

            // No fewer texts than before: another round would not converge.
            let stalled = summaries.len() >= texts.len();
            texts = summaries;
            if stalled {
                break;
            }
        }

        let pack = squeeze_into_pack(&texts, budget);
        let prompt = render_qa(Prompt::TreeSummarize, &pack, query);
        self.generate(&prompt, streaming).await
    }

    async fn compact(&self, query: &str, texts: Vec<String>, streaming: bool) -> Result<Synthesis> {
        let budget = self.pack_budget(Prompt::Refine, query);
        let packs = pack_texts(&texts, budget);
        let last = packs.len() - 1;

        let first_prompt = render_qa(Prompt::TextQa, &packs[0], query);
        if last == 0 {
            return self.generate(&first_prompt, streaming).await;
        }

        let mut answer = self.llm.complete(&first_prompt).await?.trim().to_string();

        for (i, pack) in packs.iter().enumerate().skip(1) {
            let prompt = Prompt::Refine.render(&[
                ("query", query),
                ("existing_answer", &answer),
                ("context", pack),
            ]);

            if i == last {
                return self.generate(&prompt, streaming).await;
            }
            answer = self.llm.complete(&prompt).await?.trim().to_string();
        }

        Ok(Synthesis::Text(answer))
    }

    async fn generate(&self, prompt: &str, streaming: bool) -> Result<Synthesis> {
        if streaming {
            Ok(Synthesis::Stream(self.llm.complete_stream(prompt).await?))
        } else {
            Ok(Synthesis::Text(self.llm.complete(prompt).await?))
        }
    }

    /// Characters left for context once the template and query are in.
    fn pack_budget(&self, prompt: Prompt, query: &str) -> usize {
        let overhead = prompt.template().len() + query.len();
        self.options
            .context_window_chars
            .saturating_sub(overhead)
            .max(MIN_PACK_CHARS)
    }
}

fn render_qa(prompt: Prompt, context: &str, query: &str) -> String {
    prompt.render(&[("context", context), ("query", query)])
}

/// Join the leading `texts` into a single pack of at most `budget` chars.
///
/// Each kept text gets an equal share of the budget; texts that would get
/// less than [`MIN_SHARE_CHARS`] are dropped from the tail.
pub fn squeeze_into_pack(texts: &[String], budget: usize) -> String {
    if texts.is_empty() {
        return String::new();
    }

    let sep = PACK_SEPARATOR.len();
    let room = budget.max(1) + sep;
    let keep = texts.len().min(room / (MIN_SHARE_CHARS + sep)).max(1);
    let per = (room / keep).saturating_sub(sep).max(1);

    texts[..keep]
        .iter()
        .map(|text| text.chars().take(per).collect::<String>())
        .collect::<Vec<_>>()
        .join(PACK_SEPARATOR)
}

/// Greedily join texts into packs of at most `budget` chars.
///
/// A text longer than `budget` on its own is split across packs.
pub fn pack_texts(texts: &[String], budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let mut packs = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for text in texts {
        for piece in split_chars(text, budget) {
            let piece_len = piece.chars().count();
            let needed = if current.is_empty() {
                piece_len
            } else {
                current_len + PACK_SEPARATOR.len() + piece_len
            };

            if needed > budget && !current.is_empty() {
                packs.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if !current.is_empty() {
                current.push_str(PACK_SEPARATOR);
                current_len += PACK_SEPARATOR.len();
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
    }

    if !current.is_empty() || packs.is_empty() {
        packs.push(current);
    }

    packs
}

fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

async fn collect_fragments(mut fragments: FragmentStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Chunker, IndexStore};
    use crate::llm::mock::MockModel;
    use crate::sources::{Document, SourceKind};
    use tempfile::tempdir;

    async fn build_index(docs: &[Document], dim: usize) -> (VectorIndex, Arc<EmbedBackend>) {
        let dir = tempdir().unwrap();
        let embedder = Arc::new(EmbedBackend::local(dim));
        let store = IndexStore::new(dir.path(), Chunker::new(1024, 50), embedder.clone(), 8);
        (store.build(docs).await.unwrap(), embedder)
    }

    fn three_docs(words_each: usize) -> Vec<Document> {
        ["alpha", "beta", "gamma"]
            .iter()
            .map(|name| {
                let text = vec![*name; words_each].join(" ");
                Document::from_text(name, &text, SourceKind::Wikipedia)
            })
            .collect()
    }

    fn options(mode: ResponseMode, window: usize) -> QueryOptions {
        QueryOptions {
            top_k: 3,
            response_mode: mode,
            context_window_chars: window,
        }
    }

    #[test]
    fn pack_texts_respects_budget() {
        let texts = vec!["aaaa".to_string(), "bbbb".to_string(), "cccc".to_string()];

        assert_eq!(pack_texts(&texts, 100), vec!["aaaa\n\nbbbb\n\ncccc"]);
        assert_eq!(pack_texts(&texts, 10), vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(pack_texts(&texts, 4), vec!["aaaa", "bbbb", "cccc"]);
    }

    #[test]
    fn pack_texts_splits_oversized_text() {
        let texts = vec!["abcdefghij".to_string()];
        assert_eq!(pack_texts(&texts, 4), vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn single_pack_answers_with_one_call() {
        let (index, embedder) = build_index(&three_docs(5), 64).await;
        let llm = Arc::new(MockModel::new("The answer."));
        let engine = QueryEngine::new(
            index,
            embedder,
            llm.clone(),
            options(ResponseMode::TreeSummarize, 12_000),
        );

        let response = engine.query("alpha?").await.unwrap();

        assert_eq!(response.text, "The answer.");
        assert_eq!(response.sources.len(), 3);
        assert_eq!(llm.calls(), 1);
        assert!(llm.prompts()[0].contains("Query: alpha?"));
    }

    #[tokio::test]
    async fn tree_summarize_recurses_over_packs() {
        // Each chunk is ~600 chars and the window leaves room for one per pack.
        let (index, embedder) = build_index(&three_docs(100), 64).await;
        let llm = Arc::new(MockModel::new("short summary"));
        let window = Prompt::TreeSummarize.template().len() + 700;
        let engine = QueryEngine::new(
            index,
            embedder,
            llm.clone(),
            options(ResponseMode::TreeSummarize, window),
        );

        let response = engine.query("q").await.unwrap();

        assert_eq!(response.text, "short summary");
        // three pack summaries, then one final answer over the summaries
        assert_eq!(llm.calls(), 4);
        assert!(llm.prompts()[3].contains("short summary\n\nshort summary\n\nshort summary"));
    }

    #[test]
    fn squeeze_fits_budget_and_keeps_leading_texts() {
        let texts: Vec<String> = (0..30).map(|i| format!("{i:02}{}", "x".repeat(200))).collect();

        let pack = squeeze_into_pack(&texts, 64);

        assert!(pack.chars().count() <= 64);
        assert!(pack.starts_with("00xx"));
        assert_eq!(pack.split(PACK_SEPARATOR).count(), 3);
        assert_eq!(squeeze_into_pack(&texts[..1], 64).chars().count(), 64);
        assert_eq!(squeeze_into_pack(&[], 64), "");
    }

    #[tokio::test]
    async fn long_summaries_in_tiny_window_terminate() {
        // Summaries longer than the whole budget never shrink by repacking.
        let (index, embedder) = build_index(&three_docs(100), 64).await;
        let llm = Arc::new(MockModel::new(&"y".repeat(200)));
        let engine = QueryEngine::new(
            index,
            embedder,
            llm.clone(),
            options(ResponseMode::TreeSummarize, 1),
        );

        let response = engine.query("q").await.unwrap();

        assert_eq!(response.text, "y".repeat(200));
        let prompts = llm.prompts();
        assert!(prompts.len() <= 1 + 30 * MAX_TREE_ROUNDS);
        let last = prompts.last().unwrap();
        assert!(last.len() <= Prompt::TreeSummarize.template().len() + "q".len() + MIN_PACK_CHARS);
        assert!(last.contains(&"y".repeat(20)));
    }

    #[tokio::test]
    async fn compact_refines_across_packs() {
        let (index, embedder) = build_index(&three_docs(100), 64).await;
        let llm = Arc::new(MockModel::new("refined"));
        let window = Prompt::Refine.template().len() + 700;
        let engine = QueryEngine::new(
            index,
            embedder,
            llm.clone(),
            options(ResponseMode::Compact, window),
        );

        let response = engine.query("q").await.unwrap();

        assert_eq!(response.text, "refined");
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].starts_with("Context information is below."));
        assert!(prompts[1].contains("We have provided an existing answer: refined"));
        assert!(prompts[2].contains("refine the original answer"));
    }

    #[tokio::test]
    async fn query_stream_streams_final_call() {
        let (index, embedder) = build_index(&three_docs(5), 64).await;
        let llm = Arc::new(MockModel::new("one two three"));
        let engine = QueryEngine::new(index, embedder, llm.clone(), QueryOptions::default());

        let response = engine.query_stream("gamma").await.unwrap();
        let fragments: Vec<String> = response
            .fragments
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["one ", "two ", "three"]);
        assert_eq!(response.sources[0].chunk.source, "gamma");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn empty_retrieval_yields_empty_response_without_llm() {
        let (index, embedder) = build_index(&three_docs(5), 64).await;
        let llm = Arc::new(MockModel::new("unused"));
        let engine = QueryEngine::new(
            index,
            embedder,
            llm.clone(),
            QueryOptions {
                top_k: 0,
                ..QueryOptions::default()
            },
        );

        assert_eq!(engine.query("x").await.unwrap().text, EMPTY_RESPONSE);

        let streamed = engine.query_stream("x").await.unwrap();
        let text = collect_fragments(streamed.fragments).await.unwrap();
        assert_eq!(text, EMPTY_RESPONSE);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn llm_failure_propagates() {
        let (index, embedder) = build_index(&three_docs(5), 64).await;
        let llm = Arc::new(MockModel::new("x").failing());
        let engine = QueryEngine::new(index, embedder, llm, QueryOptions::default());

        assert!(engine.query("alpha").await.is_err());
    }
}
