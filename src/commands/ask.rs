//! One-shot question against the persisted index.

use std::io::Write;

use anyhow::Result;
use futures::StreamExt;

use crate::config::RagConfig;
use crate::engine::ConversationalQueryEngine;
use crate::index::ScoredChunk;

/// Answer `question`, writing the text to `out`.
///
/// With `stream` the fragments are written as they arrive. Returns the chunks
/// the answer is grounded on.
pub async fn write_answer<W: Write>(
    engine: &mut ConversationalQueryEngine,
    question: &str,
    stream: bool,
    out: &mut W,
) -> Result<Vec<ScoredChunk>> {
    if !stream {
        let response = engine.answer_with_sources(question).await?;
        writeln!(out, "{}", response.text.trim())?;
        return Ok(response.sources);
    }

    let mut answer = engine.answer_stream(question).await?;
    while let Some(fragment) = answer.next().await {
        write!(out, "{}", fragment?)?;
        out.flush()?;
    }
    writeln!(out)?;

    let sources = answer.sources().to_vec();
    Ok(sources)
}

pub async fn run(config: RagConfig, question: &str, stream: bool, show_sources: bool) -> Result<()> {
    let mut engine = ConversationalQueryEngine::from_config(config)?;
    let mut out = std::io::stdout();

    print!("Answer: ");
    let sources = write_answer(&mut engine, question, stream, &mut out).await?;

    if show_sources {
        super::print_sources(&sources);
    }
    Ok(())
}
