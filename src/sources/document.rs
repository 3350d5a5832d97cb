//! Source-agnostic document model.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Wikipedia,
    Wikijs,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Wikipedia => write!(f, "wikipedia"),
            SourceKind::Wikijs => write!(f, "wikijs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<i64>,
}

impl DocumentMetadata {
    pub fn new(title: impl Into<String>, source: SourceKind) -> Self {
        Self {
            title: title.into(),
            source,
            url: None,
            path: None,
            summary: None,
            description: None,
            categories: Vec::new(),
            language: None,
            page_id: None,
        }
    }
}

/// A unit of text to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Plain document with a generated id, handy for ad-hoc corpora.
    pub fn from_text(title: &str, text: &str, source: SourceKind) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            text,
            DocumentMetadata::new(title, source),
        )
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
});
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|br|h[1-6]|li|ul|ol|tr|table|blockquote|pre)\b[^>]*>")
        .expect("valid regex")
});
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Reduce Wiki.js HTML to indexable plain text.
pub fn strip_html(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = BLOCK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = SPACES_RE.replace_all(&text, " ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_keeps_paragraphs() {
        let html = "<h1>Project Alpha</h1><p>Project Alpha is a secret initiative.</p><p>Lead: Dr. Brown</p>";
        let text = strip_html(html);
        assert_eq!(
            text,
            "Project Alpha\n\nProject Alpha is a secret initiative.\n\nLead: Dr. Brown"
        );
    }

    #[test]
    fn drops_scripts_and_decodes_entities() {
        let html = "<script>alert('x')</script><p>Fish &amp; chips&nbsp;&lt;3</p>";
        assert_eq!(strip_html(html), "Fish & chips <3");
    }

    #[test]
    fn plain_markdown_passes_through() {
        let md = "# Warp Core\n\nGenerates the warp field.";
        assert_eq!(strip_html(md), md);
    }

    #[test]
    fn metadata_serializes_source_lowercase() {
        let meta = DocumentMetadata::new("Rust", SourceKind::Wikipedia);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["source"], "wikipedia");
        assert!(json.get("url").is_none());
    }
}
