//! Document sources: Wikipedia and Wiki.js.

pub mod document;
pub mod wikijs;
pub mod wikipedia;

pub use document::{strip_html, Document, DocumentMetadata, SourceKind};
pub use wikijs::{NewPage, PageCreateResult, WikiJsClient};
pub use wikipedia::WikipediaClient;
