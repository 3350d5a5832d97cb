//! Minimal Wiki.js GraphQL client (page listing, fetching and creation).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::document::{strip_html, Document, DocumentMetadata, SourceKind};
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct WikiJsClient {
    http: Client,
    graphql_url: String,
    api_key: Option<String>,
}

impl WikiJsClient {
    /// Client for the Wiki.js instance at `url` (GraphQL lives at `{url}/graphql`).
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        Self::with_timeout(url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Same as [`WikiJsClient::new`] with a per-request timeout.
    pub fn with_timeout(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("wiki_rag/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::BackendUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            graphql_url: format!("{}/graphql", url.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }

    async fn post<V: Serialize, D: for<'de> Deserialize<'de>>(
        &self,
        query: &'static str,
        variables: V,
    ) -> Result<D> {
        let mut request = self
            .http
            .post(&self.graphql_url)
            .json(&GraphQlRequest { query, variables });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Wiki.js request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Failed to read Wiki.js response: {}", e)))?;

        if status != StatusCode::OK {
            return Err(Error::BackendUnavailable(format!(
                "Wiki.js returned HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let envelope: GraphQlResponse<D> = serde_json::from_str(&text).map_err(|e| {
            Error::MalformedResponse(format!("Wiki.js returned non-JSON body: {} ({})", text, e))
        })?;

        if let Some(errors) = envelope.errors {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::GraphQl(message));
        }

        envelope
            .data
            .ok_or_else(|| Error::MalformedResponse("Empty response from Wiki.js".to_string()))
    }

    /// Ids and paths of every page.
    pub async fn list_pages(&self) -> Result<Vec<PageSummary>> {
        let data: ListData = self.post(LIST_QUERY, serde_json::json!({})).await?;
        Ok(data.pages.list)
    }

    /// One page with its content.
    pub async fn fetch_page(&self, id: i64) -> Result<WikiPage> {
        let data: SingleData = self.post(SINGLE_QUERY, SingleVariables { id }).await?;
        data.pages
            .single
            .ok_or_else(|| Error::GraphQl(format!("page {} not found", id)))
    }

    /// Every page as a [`Document`]. A failing list query is an error;
    /// pages that fail individually are logged and skipped.
    pub async fn fetch_all_pages(&self) -> Result<Vec<Document>> {
        let pages = self.list_pages().await?;
        let mut documents = Vec::with_capacity(pages.len());

        for summary in pages {
            match self.fetch_page(summary.id).await {
                Ok(page) => documents.push(page.into_document()),
                Err(e) => warn!("Could not fetch page {}: {}", summary.id, e),
            }
        }

        info!("Fetched {} pages from Wiki.js", documents.len());
        Ok(documents)
    }

    /// Create a page.
    pub async fn create_page(&self, page: &NewPage) -> Result<PageCreateResult> {
        if page.path.trim().is_empty() || page.title.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "page path and title must not be empty".to_string(),
            ));
        }

        let data: CreateData = self.post(CREATE_MUTATION, page).await?;
        Ok(data.pages.create.response_result)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageSummary {
    pub id: i64,
    pub path: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WikiPage {
    pub id: i64,
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl WikiPage {
    pub fn into_document(self) -> Document {
        let mut metadata = DocumentMetadata::new(self.title, SourceKind::Wikijs);
        metadata.page_id = Some(self.id);
        metadata.path = Some(self.path);
        metadata.description = self.description.filter(|d| !d.is_empty());

        Document::new(format!("wikijs-{}", self.id), strip_html(&self.content), metadata)
    }
}

/// Input of the `pages.create` mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub path: String,
    pub title: String,
    pub content: String,
    pub description: String,
    pub editor: String,
    pub is_published: bool,
    pub is_private: bool,
    pub locale: String,
    pub tags: Vec<String>,
}

impl NewPage {
    /// Markdown page, published, `en` locale.
    pub fn markdown(path: &str, title: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            description: String::new(),
            editor: "markdown".to_string(),
            is_published: true,
            is_private: false,
            locale: "en".to_string(),
            tags: Vec::new(),
        }
    }

    /// HTML page edited with the visual editor.
    pub fn html(path: &str, title: &str, content: &str) -> Self {
        Self {
            editor: "ckeditor".to_string(),
            ..Self::markdown(path, title, content)
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCreateResult {
    pub succeeded: bool,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct ListData {
    pages: ListPages,
}

#[derive(Deserialize)]
struct ListPages {
    list: Vec<PageSummary>,
}

#[derive(Serialize)]
struct SingleVariables {
    id: i64,
}

#[derive(Deserialize)]
struct SingleData {
    pages: SinglePages,
}

#[derive(Deserialize)]
struct SinglePages {
    single: Option<WikiPage>,
}

#[derive(Deserialize)]
struct CreateData {
    pages: CreatePages,
}

#[derive(Deserialize)]
struct CreatePages {
    create: CreatePayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayload {
    response_result: PageCreateResult,
}

const LIST_QUERY: &str = r#"
query {
  pages {
    list {
      id
      path
      title
    }
  }
}
"#;

const SINGLE_QUERY: &str = r#"
query ($id: Int!) {
  pages {
    single(id: $id) {
      id
      path
      title
      description
      content
    }
  }
}
"#;

const CREATE_MUTATION: &str = r#"
mutation ($content: String!, $description: String!, $editor: String!, $isPublished: Boolean!, $isPrivate: Boolean!, $locale: String!, $path: String!, $tags: [String]!, $title: String!) {
  pages {
    create(
      content: $content
      description: $description
      editor: $editor
      isPublished: $isPublished
      isPrivate: $isPrivate
      locale: $locale
      path: $path
      tags: $tags
      title: $title
    ) {
      responseResult {
        succeeded
        errorCode
        slug
        message
      }
    }
  }
}
"#;
