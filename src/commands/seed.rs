//! Create sample pages in Wiki.js.
//!
//! Pages come from a YAML file or one of the built-in demo sets. Nested pages
//! (`children`) are created parent first so hierarchical paths resolve.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::sources::{NewPage, WikiJsClient};

const PROJECTS_YAML: &str = include_str!("../../data/seed/projects.yml");
const MISSION_YAML: &str = include_str!("../../data/seed/mission.yml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoSet {
    /// Three company pages (projects and HR), HTML.
    Projects,
    /// Nested space mission pages, markdown.
    Mission,
}

impl DemoSet {
    fn yaml(self) -> &'static str {
        match self {
            DemoSet::Projects => PROJECTS_YAML,
            DemoSet::Mission => MISSION_YAML,
        }
    }
}

/// A seed file: defaults plus a tree of pages.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default = "default_editor")]
    pub editor: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pages: Vec<SeedPage>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPage {
    pub path: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    pub editor: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub children: Vec<SeedPage>,
}

fn default_editor() -> String {
    "markdown".to_string()
}

impl SeedFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid seed file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn demo(set: DemoSet) -> Result<Self> {
        Self::parse(set.yaml())
    }

    /// Every page, parents before their children.
    pub fn flatten(&self) -> Vec<NewPage> {
        let mut pages = Vec::new();
        self.push_pages(&self.pages, &mut pages);
        pages
    }

    fn push_pages(&self, nodes: &[SeedPage], out: &mut Vec<NewPage>) {
        for node in nodes {
            let mut page = NewPage::markdown(&node.path, &node.title, &node.content)
                .with_description(&node.description)
                .with_tags(node.tags.clone().unwrap_or_else(|| self.tags.clone()));
            page.editor = node.editor.clone().unwrap_or_else(|| self.editor.clone());
            out.push(page);

            self.push_pages(&node.children, out);
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub failed: Vec<String>,
}

/// Create `pages` in order. Failures are reported and do not stop the run.
pub async fn create_pages(client: &WikiJsClient, pages: &[NewPage]) -> SeedReport {
    let mut report = SeedReport::default();

    for page in pages {
        match client.create_page(page).await {
            Ok(result) if result.succeeded => {
                println!("Created: {}", page.path);
                report.created.push(page.path.clone());
            }
            Ok(result) => {
                let message = result.message.unwrap_or_else(|| "unknown error".to_string());
                println!("Failed to create {}: {}", page.path, message);
                report.failed.push(page.path.clone());
            }
            Err(e) => {
                warn!("Error creating {}: {}", page.path, e);
                println!("Error creating {}: {}", page.path, e);
                report.failed.push(page.path.clone());
            }
        }
    }

    report
}

pub async fn run(config: &RagConfig, file: Option<&Path>, demo: DemoSet) -> Result<SeedReport> {
    let seed = match file {
        Some(path) => SeedFile::load(path)?,
        None => SeedFile::demo(demo)?,
    };
    let pages = seed.flatten();

    if config.wiki_api_key.is_none() {
        warn!("WIKI_API_KEY is not set; Wiki.js will most likely reject page creation");
    }

    let client = WikiJsClient::with_timeout(
        &config.wiki_url,
        config.wiki_api_key.clone(),
        config.request_timeout(),
    )?;
    info!("Seeding {} pages into {}", pages.len(), client.graphql_url());

    let report = create_pages(&client, &pages).await;
    println!(
        "Seeding complete: {} created, {} failed",
        report.created.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn mission_demo_flattens_parent_first() {
        let pages = SeedFile::demo(DemoSet::Mission).unwrap().flatten();
        let paths: Vec<&str> = pages.iter().map(|p| p.path.as_str()).collect();

        assert_eq!(
            paths,
            vec![
                "mission-alpha",
                "mission-alpha/vehicle",
                "mission-alpha/vehicle/propulsion",
                "mission-alpha/vehicle/propulsion/warp-core",
                "mission-alpha/vehicle/propulsion/warp-core/injector",
                "mission-alpha/vehicle/life-support",
                "mission-alpha/crew",
            ]
        );
        assert!(pages.iter().all(|p| p.editor == "markdown"));
        assert!(pages.iter().all(|p| p.tags == vec!["sample", "rag-test"]));
        assert!(pages[0].content.starts_with("# Mission Alpha\n"));
    }

    #[test]
    fn projects_demo_uses_html_and_page_tags() {
        let pages = SeedFile::demo(DemoSet::Projects).unwrap().flatten();

        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.editor == "ckeditor"));
        assert_eq!(pages[0].title, "Project Alpha");
        assert_eq!(pages[0].description, "Details about Project Alpha");
        assert_eq!(pages[0].tags, vec!["project", "top-secret"]);
        assert_eq!(pages[2].path, "hr/handbook");
        assert!(pages[1].content.contains("teleportation"));
    }

    #[test]
    fn page_fields_override_file_defaults() {
        let seed = SeedFile::parse(
            r##"
tags: [docs]
pages:
  - path: guide
    title: Guide
    content: "# Guide"
    children:
      - path: guide/html
        title: HTML Page
        content: "<p>hi</p>"
        editor: ckeditor
        tags: [raw]
"##,
        )
        .unwrap();
        let pages = seed.flatten();

        assert_eq!(pages[0].editor, "markdown");
        assert_eq!(pages[0].tags, vec!["docs"]);
        assert_eq!(pages[1].editor, "ckeditor");
        assert_eq!(pages[1].tags, vec!["raw"]);
    }

    #[test]
    fn seed_file_requires_pages() {
        assert!(SeedFile::parse("editor: markdown\n").is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.yml");
        fs::write(&path, "pages:\n  - path: a\n    title: A\n    content: text\n").unwrap();

        let pages = SeedFile::load(&path).unwrap().flatten();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].path, "a");
    }

    #[tokio::test]
    async fn create_pages_reports_failures() {
        let server = MockServer::start_async().await;

        let ok = server.mock(|when, then| {
            when.method(POST)
                .path("/graphql")
                .is_true(|req| String::from_utf8_lossy(req.body().as_ref()).contains(r#""path":"projects/alpha""#));
            then.status(200).json_body(json!({
                "data": { "pages": { "create": { "responseResult": {
                    "succeeded": true, "errorCode": 0, "slug": "ok", "message": "Page created"
                }}}}
            }));
        });
        let duplicate = server.mock(|when, then| {
            when.method(POST)
                .path("/graphql")
                .is_true(|req| String::from_utf8_lossy(req.body().as_ref()).contains(r#""path":"projects/beta""#));
            then.status(200).json_body(json!({
                "data": { "pages": { "create": { "responseResult": {
                    "succeeded": false, "errorCode": 6002, "slug": "PageDuplicateCreate",
                    "message": "Cannot create this page because an entry already exists at the same path."
                }}}}
            }));
        });
        let broken = server.mock(|when, then| {
            when.method(POST)
                .path("/graphql")
                .is_true(|req| String::from_utf8_lossy(req.body().as_ref()).contains(r#""path":"hr/handbook""#));
            then.status(500).body("boom");
        });

        let client = WikiJsClient::new(&server.base_url(), Some("key".into())).unwrap();
        let pages = SeedFile::demo(DemoSet::Projects).unwrap().flatten();
        let report = create_pages(&client, &pages).await;

        assert_eq!(report.created, vec!["projects/alpha"]);
        assert_eq!(report.failed, vec!["projects/beta", "hr/handbook"]);
        ok.assert_calls(1);
        duplicate.assert_calls(1);
        broken.assert_calls(1);
    }
}
