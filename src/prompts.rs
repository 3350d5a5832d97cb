//! Prompt templates.
//!
//! Every template has a built-in default. A Markdown file with the same name
//! in the `prompts/` directory replaces it, so wording can be tuned without a
//! rebuild. Placeholders use `{name}` syntax.

use std::path::PathBuf;

use crate::{Error, Result};

const CONDENSE_QUESTION: &str = "Given the following conversation history and a follow-up question, \
rephrase the follow-up question to be a standalone question.\n\n\
Chat History:\n{history}\n\n\
Follow Up Input: {question}\n\
Standalone question:";

const TREE_SUMMARIZE: &str = "Context information from multiple sources is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the information from multiple sources and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: ";

const TEXT_QA: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: ";

const REFINE: &str = "The original query is as follows: {query}\n\
We have provided an existing answer: {existing_answer}\n\
We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
------------\n\
{context}\n\
------------\n\
Given the new context, refine the original answer to better answer the query. \
If the context isn't useful, return the original answer.\n\
Refined Answer: ";

/// Available prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Rewrite a follow-up into a standalone question.
    CondenseQuestion,
    /// Answer from several chunks at once (tree summarize).
    TreeSummarize,
    /// Answer from the first pack of chunks (compact).
    TextQa,
    /// Refine an existing answer with more context (compact).
    Refine,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::CondenseQuestion => "condense_question.md",
            Prompt::TreeSummarize => "tree_summarize.md",
            Prompt::TextQa => "text_qa.md",
            Prompt::Refine => "refine.md",
        }
    }

    /// Built-in template text.
    pub fn default_template(&self) -> &'static str {
        match self {
            Prompt::CondenseQuestion => CONDENSE_QUESTION,
            Prompt::TreeSummarize => TREE_SUMMARIZE,
            Prompt::TextQa => TEXT_QA,
            Prompt::Refine => REFINE,
        }
    }

    /// Template from `prompts/` if present, otherwise the built-in one.
    pub fn template(&self) -> String {
        load_prompt(self.filename()).unwrap_or_else(|_| self.default_template().to_string())
    }

    /// Fill the template's `{name}` placeholders.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        render_template(&self.template(), vars)
    }
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Values are inserted verbatim, so braces inside retrieved text or user
/// questions are never re-expanded.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match vars.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Load a prompt by file name.
pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgument(format!("Failed to load prompt {}: {}", filename, e))
    })
}

/// Prompt directory.
pub fn prompts_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WIKI_RAG_PROMPTS_DIR") {
        return PathBuf::from(dir);
    }

    let candidates = [PathBuf::from("prompts"), PathBuf::from("../prompts")];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// All prompts.
pub fn list_prompts() -> Vec<Prompt> {
    vec![
        Prompt::CondenseQuestion,
        Prompt::TreeSummarize,
        Prompt::TextQa,
        Prompt::Refine,
    ]
}
