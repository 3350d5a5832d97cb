use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sources::Document;

/// Text chunk produced by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk id
    pub id: Uuid,
    /// Raw text of the chunk
    pub text: String,
    /// Word index of the first token
    pub start: usize,
    /// Word index after the last token
    pub end: usize,
    /// Title of the document the chunk came from
    pub source: String,
}

impl Chunk {
    pub fn new(text: String, start: usize, end: usize, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            start,
            end,
            source: source.into(),
        }
    }
}

/// Word-window chunker with overlap.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a new chunker. `size` is at least 1, `overlap` at most `size - 1`.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping chunks.
    pub fn chunk(&self, text: &str, source: impl Into<String>) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.size - self.overlap;
        let mut chunks = Vec::new();
        let mut idx = 0;
        let source = source.into();

        while idx < words.len() {
            let end = (idx + self.size).min(words.len());
            let chunk_text = words[idx..end].join(" ");
            chunks.push(Chunk::new(chunk_text, idx, end, source.clone()));

            if end == words.len() {
                break;
            }
            idx += step;
        }

        chunks
    }

    /// Chunk a document, labelling every chunk with its title.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk(&document.text, document.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceKind;

    #[test]
    fn chunker_respects_overlap() {
        let chunker = Chunker::new(4, 1);
        let text = "one two three four five six seven";
        let chunks = chunker.chunk(text, "test");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three four");
        assert_eq!(chunks[1].text, "four five six seven");
        assert_eq!(chunks[0].end - chunks[0].start, 4);
    }

    #[test]
    fn chunker_whitespace_only_returns_empty() {
        let chunker = Chunker::new(4, 1);
        assert!(chunker.chunk("", "test").is_empty());
        assert!(chunker.chunk("   \t\n  ", "test").is_empty());
    }

    #[test]
    fn chunker_single_word() {
        let chunker = Chunker::new(4, 1);
        let chunks = chunker.chunk("hello", "test");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 1));
    }

    #[test]
    fn chunker_no_overlap() {
        let chunker = Chunker::new(2, 0);
        let texts: Vec<String> = chunker
            .chunk("a b c d e f", "test")
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["a b", "c d", "e f"]);
    }

    #[test]
    fn chunker_clamps_overlap_and_size() {
        let chunker = Chunker::new(3, 10);
        assert_eq!(chunker.overlap(), 2);
        assert_eq!(chunker.chunk("a b c d e f g", "test").len(), 5);

        let tiny = Chunker::new(0, 0);
        assert_eq!(tiny.size(), 1);
        assert_eq!(tiny.chunk("word", "test").len(), 1);
    }

    #[test]
    fn windows_cover_every_word() {
        let chunker = Chunker::new(5, 2);
        let text = (0..23).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunker.chunk(&text, "test");

        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, 23);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start, pair[0].end - 2);
        }
    }

    #[test]
    fn chunk_document_uses_title_as_source() {
        let doc = Document::from_text("Warp Core", "Generates the warp field.", SourceKind::Wikijs);
        let chunks = Chunker::new(1024, 50).chunk_document(&doc);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "Warp Core");
    }

    #[test]
    fn chunker_unicode_text() {
        let chunker = Chunker::new(3, 1);
        let text = "Привет мир тест";
        let chunks = chunker.chunk(text, "test");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn chunk_has_unique_id() {
        let c1 = Chunk::new("text1".into(), 0, 1, "src");
        let c2 = Chunk::new("text2".into(), 0, 1, "src");
        assert_ne!(c1.id, c2.id);
    }
}
