//! Interactive chat over the persisted index.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::config::RagConfig;
use crate::engine::ConversationalQueryEngine;

const RULE_WIDTH: usize = 60;

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Exit,
    Clear,
    Skip,
    Question(String),
}

pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "exit" | "quit" | "q" => ChatInput::Exit,
        "clear" | "reset" => ChatInput::Clear,
        "" => ChatInput::Skip,
        _ => ChatInput::Question(line.to_string()),
    }
}

/// Read questions from `input` until exit or end of input, streaming each
/// answer to `out`. Returns the number of questions answered.
///
/// A failed question is reported and the session continues.
pub async fn chat_session<R, W>(
    engine: &mut ConversationalQueryEngine,
    input: R,
    out: &mut W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        write!(out, "\nYour question: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };

        match parse_input(&line) {
            ChatInput::Exit => {
                writeln!(out, "\nGoodbye!")?;
                break;
            }
            ChatInput::Clear => {
                engine.clear_history();
                writeln!(out, "\n[Chat history cleared]")?;
            }
            ChatInput::Skip => {}
            ChatInput::Question(question) => {
                writeln!(out, "\n{}", "-".repeat(RULE_WIDTH))?;
                write!(out, "Answer: ")?;
                match super::ask::write_answer(engine, &question, true, out).await {
                    Ok(_) => answered += 1,
                    Err(e) => {
                        warn!("Question failed: {:#}", e);
                        writeln!(out, "\n[X] Error: {}", e)?;
                    }
                }
                writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
            }
        }
    }

    Ok(answered)
}

pub async fn run(config: RagConfig) -> Result<()> {
    println!("\n{}", "=".repeat(RULE_WIDTH));
    println!("Wiki RAG - Interactive Query Interface");
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("\nInitializing query engine...");

    let mut engine = ConversationalQueryEngine::from_config(config)?;
    engine.initialize().await?;

    println!("\nQuery engine ready!");
    println!("Type 'exit' or 'quit' to stop, 'clear' to start a new conversation.");

    let stdin = BufReader::new(tokio::io::stdin());
    chat_session(&mut engine, stdin, &mut std::io::stdout()).await?;
    Ok(())
}
