//! Wikipedia reader over the MediaWiki action API.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::document::{Document, DocumentMetadata, SourceKind};
use crate::{Error, Result};

/// How many disambiguation options are logged.
const DISAMBIGUATION_PREVIEW: usize = 5;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct WikipediaClient {
    http: Client,
    base_url: String,
    language: String,
    max_articles: usize,
}

impl WikipediaClient {
    /// Client for `https://{language}.wikipedia.org`.
    pub fn new(language: &str, max_articles: usize) -> Result<Self> {
        Self::with_timeout(language, max_articles, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Client for `https://{language}.wikipedia.org` with a per-request timeout.
    pub fn with_timeout(language: &str, max_articles: usize, timeout: Duration) -> Result<Self> {
        let base_url = format!("https://{}.wikipedia.org/w/api.php", language);
        Self::with_base_url_and_timeout(base_url, language, max_articles, timeout)
    }

    /// Client against a custom `api.php` endpoint (primarily for tests).
    pub fn with_base_url<S: Into<String>>(
        base_url: S,
        language: &str,
        max_articles: usize,
    ) -> Result<Self> {
        Self::with_base_url_and_timeout(
            base_url,
            language,
            max_articles,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn with_base_url_and_timeout<S: Into<String>>(
        base_url: S,
        language: &str,
        max_articles: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("wiki_rag/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::BackendUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            language: language.to_string(),
            max_articles: max_articles.max(1),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    async fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("Wikipedia request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::BackendUnavailable(format!(
                "Wikipedia returned HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("Wikipedia returned invalid JSON: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(Error::MalformedResponse(format!(
                "Wikipedia API error {}: {}",
                error.code, error.info
            )));
        }

        envelope
            .query
            .ok_or_else(|| Error::MalformedResponse("Wikipedia response has no query".to_string()))
    }

    /// Titles matching `topic`. Failures are logged and yield an empty list.
    pub async fn search_articles(&self, topic: &str, limit: Option<usize>) -> Vec<String> {
        let limit = limit.unwrap_or(self.max_articles).max(1).to_string();

        let result: Result<SearchQuery> = self
            .get(&[
                ("list", "search"),
                ("srsearch", topic),
                ("srlimit", &limit),
                ("srprop", ""),
            ])
            .await;

        match result {
            Ok(query) => {
                let titles: Vec<String> = query.search.into_iter().map(|hit| hit.title).collect();
                info!("Found {} articles for topic: {}", titles.len(), topic);
                titles
            }
            Err(e) => {
                warn!("Error searching for topic '{}': {}", topic, e);
                Vec::new()
            }
        }
    }

    /// Fetch one article. Missing pages and errors are logged and yield `None`.
    ///
    /// A disambiguation page is resolved by following its first option once.
    pub async fn fetch_article(&self, title: &str) -> Option<Document> {
        match self.try_fetch_article(title).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Error fetching article '{}': {}", title, e);
                None
            }
        }
    }

    async fn try_fetch_article(&self, title: &str) -> Result<Option<Document>> {
        let Some(page) = self.query_page(title).await? else {
            warn!("Page not found: {}", title);
            return Ok(None);
        };

        if !page.is_disambiguation() {
            return Ok(Some(self.to_document(page)));
        }

        let options = self.disambiguation_options(&page.title).await?;
        let preview = &options[..options.len().min(DISAMBIGUATION_PREVIEW)];
        warn!("Disambiguation page for '{}'. Options: {:?}", title, preview);

        let Some(first) = options.first() else {
            return Ok(None);
        };

        match self.query_page(first).await? {
            Some(target) if !target.is_disambiguation() => Ok(Some(self.to_document(target))),
            Some(_) => {
                warn!("'{}' is also a disambiguation page, giving up", first);
                Ok(None)
            }
            None => {
                warn!("Page not found: {}", first);
                Ok(None)
            }
        }
    }

    async fn query_page(&self, title: &str) -> Result<Option<WikiPage>> {
        debug!(title, "Fetching Wikipedia page");

        let query: PagesQuery = self
            .get(&[
                ("prop", "extracts|info|categories|pageprops"),
                ("titles", title),
                ("explaintext", "1"),
                ("inprop", "url"),
                ("redirects", "1"),
                ("cllimit", "max"),
                ("clshow", "!hidden"),
                ("ppprop", "disambiguation"),
            ])
            .await?;

        Ok(query
            .pages
            .into_iter()
            .find(|page| !page.missing && !page.invalid))
    }

    async fn disambiguation_options(&self, title: &str) -> Result<Vec<String>> {
        let query: PagesQuery = self
            .get(&[
                ("prop", "links"),
                ("titles", title),
                ("plnamespace", "0"),
                ("pllimit", "max"),
            ])
            .await?;

        Ok(query
            .pages
            .into_iter()
            .flat_map(|page| page.links)
            .map(|link| link.title)
            .collect())
    }

    fn to_document(&self, page: WikiPage) -> Document {
        let text = page.extract.unwrap_or_default();
        let summary = lead_section(&text);

        let mut metadata = DocumentMetadata::new(page.title.clone(), SourceKind::Wikipedia);
        metadata.url = page.fullurl;
        metadata.summary = (!summary.is_empty()).then_some(summary);
        metadata.categories = page
            .categories
            .into_iter()
            .map(|c| {
                c.title
                    .strip_prefix("Category:")
                    .map(str::to_string)
                    .unwrap_or(c.title)
            })
            .collect();
        metadata.language = Some(self.language.clone());
        metadata.page_id = page.pageid;

        let id = match page.pageid {
            Some(id) => format!("wikipedia-{}-{}", self.language, id),
            None => format!("wikipedia-{}-{}", self.language, page.title),
        };

        Document::new(id, text, metadata)
    }

    /// Fetch up to `limit` articles found by searching `topic`.
    pub async fn fetch_articles_by_topic(&self, topic: &str, limit: Option<usize>) -> Vec<Document> {
        let titles = self.search_articles(topic, limit).await;
        self.fetch_articles_by_titles(&titles).await
    }

    /// Fetch the named articles, skipping the ones that fail.
    pub async fn fetch_articles_by_titles(&self, titles: &[String]) -> Vec<Document> {
        let mut documents = Vec::with_capacity(titles.len());

        for title in titles {
            info!("Fetching article: {}", title);
            if let Some(doc) = self.fetch_article(title).await {
                documents.push(doc);
            }
        }

        info!("Successfully fetched {} articles", documents.len());
        documents
    }
}

/// Text before the first `== Section ==` heading of a plain-text extract.
fn lead_section(text: &str) -> String {
    let end = text.find("\n==").unwrap_or(text.len());
    text[..end].trim().to_string()
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    query: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    pageid: Option<i64>,
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    extract: Option<String>,
    fullurl: Option<String>,
    #[serde(default)]
    categories: Vec<TitleRef>,
    pageprops: Option<PageProps>,
    #[serde(default)]
    links: Vec<TitleRef>,
}

impl WikiPage {
    fn is_disambiguation(&self) -> bool {
        self.pageprops
            .as_ref()
            .is_some_and(|props| props.disambiguation.is_some())
    }
}

#[derive(Debug, Deserialize)]
struct PageProps {
    disambiguation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TitleRef {
    title: String,
}
