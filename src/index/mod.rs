//! Vector index: chunking, embeddings, persistence and answer synthesis.

pub mod chunker;
pub mod embedder;
pub mod query;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use chunker::{Chunk, Chunker};
pub use embedder::{cosine_similarity, normalize, EmbedBackend, EmbedderInfo, LocalEmbedder};
pub use query::{QueryEngine, QueryOptions, Response, StreamingResponse};
pub use store::{read_manifest, IndexManifest, IndexStore, ScoredChunk, StoredChunk, VectorIndex};

/// File name of the persisted index inside the storage directory.
pub const INDEX_FILE: &str = "index.json";

/// Lock file held while the index is being written.
pub const LOCK_FILE: &str = ".lock";

/// Persisted format version.
pub const INDEX_VERSION: u32 = 1;

/// How retrieved chunks are turned into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Summarize packs of chunks, then summarize the summaries.
    #[default]
    TreeSummarize,
    /// Answer from the first pack, refine with the rest.
    Compact,
}

impl FromStr for ResponseMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "tree_summarize" => Ok(ResponseMode::TreeSummarize),
            "compact" => Ok(ResponseMode::Compact),
            other => Err(Error::Config(format!(
                "unknown response mode '{}' (expected tree_summarize | compact)",
                other
            ))),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::TreeSummarize => write!(f, "tree_summarize"),
            ResponseMode::Compact => write!(f, "compact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_mode_parses_both_spellings() {
        assert_eq!(
            "tree_summarize".parse::<ResponseMode>().unwrap(),
            ResponseMode::TreeSummarize
        );
        assert_eq!(
            "Tree-Summarize".parse::<ResponseMode>().unwrap(),
            ResponseMode::TreeSummarize
        );
        assert_eq!("compact".parse::<ResponseMode>().unwrap(), ResponseMode::Compact);
        assert!("refine".parse::<ResponseMode>().is_err());
    }

    #[test]
    fn response_mode_display_round_trips() {
        for mode in [ResponseMode::TreeSummarize, ResponseMode::Compact] {
            assert_eq!(mode.to_string().parse::<ResponseMode>().unwrap(), mode);
        }
    }
}
