//! Persistent vector index.
//!
//! The index lives in `storage_dir/index.json`: a manifest describing how it
//! was built plus every chunk with its embedding. Writers hold an exclusive
//! `fs2` lock on `storage_dir/.lock`; the JSON is written to a temp file and
//! renamed into place so readers never observe a partial index.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::chunker::{Chunk, Chunker};
use super::embedder::{cosine_similarity, EmbedBackend, EmbedderInfo};
use super::{INDEX_FILE, INDEX_VERSION, LOCK_FILE};
use crate::config::RagConfig;
use crate::metrics;
use crate::sources::Document;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub built_at: DateTime<Utc>,
    pub embedder: EmbedderInfo,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    #[serde(default)]
    pub document_count: usize,
    #[serde(default)]
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub embedding: Vec<f32>,
}

/// A retrieval hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub doc_id: String,
    pub url: Option<String>,
    pub score: f32,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    manifest: &'a IndexManifest,
    chunks: &'a [StoredChunk],
}

#[derive(Deserialize)]
struct PersistedIndex {
    manifest: IndexManifest,
    chunks: Vec<StoredChunk>,
}

/// In-memory index, ready for similarity search.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    chunks: Vec<StoredChunk>,
}

impl VectorIndex {
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn chunks(&self) -> &[StoredChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k chunks by cosine similarity, best first.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(f32, &StoredChunk)> = self
            .chunks
            .iter()
            .map(|stored| (cosine_similarity(query_embedding, &stored.embedding), stored))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, stored)| ScoredChunk {
                chunk: stored.chunk.clone(),
                doc_id: stored.doc_id.clone(),
                url: stored.url.clone(),
                score,
            })
            .collect()
    }
}

/// Builds, persists and reloads the vector index.
pub struct IndexStore {
    storage_dir: PathBuf,
    chunker: Chunker,
    embedder: Arc<EmbedBackend>,
    batch_size: usize,
}

impl IndexStore {
    pub fn new(
        storage_dir: impl Into<PathBuf>,
        chunker: Chunker,
        embedder: Arc<EmbedBackend>,
        batch_size: usize,
    ) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            chunker,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &RagConfig, embedder: Arc<EmbedBackend>) -> Self {
        Self::new(
            &config.storage_dir,
            Chunker::new(config.chunk_size, config.chunk_overlap),
            embedder,
            config.embed_batch_size,
        )
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.storage_dir.join(INDEX_FILE)
    }

    pub fn embedder(&self) -> Arc<EmbedBackend> {
        Arc::clone(&self.embedder)
    }

    pub fn exists(&self) -> bool {
        self.index_path().is_file()
    }

    /// Chunk, embed and persist `documents`, replacing any previous index.
    pub async fn build(&self, documents: &[Document]) -> Result<VectorIndex> {
        let started = Instant::now();
        let result = self.embed_and_persist(documents).await;
        match &result {
            Ok(index) => metrics::record_index_build(
                started.elapsed(),
                index.manifest.document_count,
                index.len(),
                true,
            ),
            Err(_) => metrics::record_index_build(started.elapsed(), 0, 0, false),
        }
        result
    }

    async fn embed_and_persist(&self, documents: &[Document]) -> Result<VectorIndex> {
        if documents.is_empty() {
            return Err(Error::EmptyInput("no documents to index".to_string()));
        }

        let mut pending: Vec<(Chunk, &Document)> = Vec::new();
        for document in documents {
            for chunk in self.chunker.chunk_document(document) {
                pending.push((chunk, document));
            }
        }

        if pending.is_empty() {
            return Err(Error::EmptyInput("documents contain no text".to_string()));
        }

        info!(
            "Embedding {} chunks from {} documents",
            pending.len(),
            documents.len()
        );

        let mut chunks = Vec::with_capacity(pending.len());
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(chunk, _)| chunk.text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;

            if embeddings.len() != batch.len() {
                return Err(Error::MalformedResponse(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }

            for ((chunk, document), embedding) in batch.iter().zip(embeddings) {
                chunks.push(StoredChunk {
                    chunk: chunk.clone(),
                    doc_id: document.id.clone(),
                    url: document.metadata.url.clone(),
                    embedding,
                });
            }
            debug!("Embedded {}/{} chunks", chunks.len(), pending.len());
        }

        let manifest = IndexManifest {
            version: INDEX_VERSION,
            built_at: Utc::now(),
            embedder: self.embedder.info(),
            chunk_size: self.chunker.size(),
            chunk_overlap: self.chunker.overlap(),
            document_count: documents.len(),
            chunk_count: chunks.len(),
        };

        let index = VectorIndex { manifest, chunks };
        self.persist(&index)?;

        info!(
            "Index with {} chunks saved to {}",
            index.len(),
            self.index_path().display()
        );
        Ok(index)
    }

    fn persist(&self, index: &VectorIndex) -> Result<()> {
        fs::create_dir_all(&self.storage_dir)?;
        let _lock = IndexLock::acquire(&self.storage_dir)?;

        let persisted = PersistedIndexRef {
            manifest: &index.manifest,
            chunks: &index.chunks,
        };

        let tmp_path = self.storage_dir.join(format!("{}.tmp", INDEX_FILE));
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer(&mut writer, &persisted)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp_path, self.index_path())?;

        Ok(())
    }

    /// Load the persisted index and check it matches the configured embedder.
    pub async fn load(&self) -> Result<VectorIndex> {
        let persisted = self.read()?;

        let expected = self.embedder.info();
        if persisted.manifest.embedder != expected {
            return Err(Error::InvalidIndex(format!(
                "index was built with {} but {} is configured; rebuild the index",
                persisted.manifest.embedder, expected
            )));
        }

        info!(
            "Loaded index with {} chunks from {}",
            persisted.chunks.len(),
            self.index_path().display()
        );
        metrics::record_index_size(persisted.manifest.document_count, persisted.chunks.len());

        Ok(VectorIndex {
            manifest: persisted.manifest,
            chunks: persisted.chunks,
        })
    }

    fn read(&self) -> Result<PersistedIndex> {
        read_index(&self.storage_dir)
    }
}

/// Manifest of the index persisted in `storage_dir`, without embedder checks.
pub fn read_manifest(storage_dir: &Path) -> Result<IndexManifest> {
    Ok(read_index(storage_dir)?.manifest)
}

fn read_index(storage_dir: &Path) -> Result<PersistedIndex> {
    let path = storage_dir.join(INDEX_FILE);
    if !path.is_file() {
        return Err(Error::IndexNotFound(storage_dir.display().to_string()));
    }

    let content = fs::read_to_string(&path)?;
    let persisted: PersistedIndex = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidIndex(format!("{}: {}", path.display(), e)))?;

    if persisted.manifest.version != INDEX_VERSION {
        return Err(Error::InvalidIndex(format!(
            "unsupported index version {} (expected {})",
            persisted.manifest.version, INDEX_VERSION
        )));
    }

    Ok(persisted)
}

/// Exclusive lock on the storage directory while the index is written.
pub struct IndexLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl IndexLock {
    pub fn acquire(storage_dir: &Path) -> Result<Self> {
        let path = storage_dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => Err(Error::IndexLocked),
        }
    }

    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceKind;
    use tempfile::tempdir;

    fn docs() -> Vec<Document> {
        vec![
            Document::from_text(
                "Project Alpha",
                "Project Alpha is a secret initiative to build a time machine.",
                SourceKind::Wikijs,
            ),
            Document::from_text(
                "Project Beta",
                "Project Beta focuses on teleportation and is on hold.",
                SourceKind::Wikijs,
            ),
            Document::from_text(
                "Employee Handbook",
                "All employees must wear a badge. Lunch is from 12 PM to 1 PM.",
                SourceKind::Wikijs,
            ),
        ]
    }

    fn store(dir: &Path, dim: usize) -> IndexStore {
        IndexStore::new(dir, Chunker::new(8, 2), Arc::new(EmbedBackend::local(dim)), 2)
    }

    #[tokio::test]
    async fn build_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 64);

        let built = store.build(&docs()).await.unwrap();
        assert!(store.exists());
        assert!(!dir.path().join(LOCK_FILE).exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), built.len());
        assert_eq!(loaded.manifest(), built.manifest());
        assert_eq!(loaded.manifest().document_count, 3);
        assert_eq!(loaded.manifest().chunk_size, 8);
        assert_eq!(loaded.manifest().chunk_overlap, 2);
        assert_eq!(loaded.manifest().chunk_count, built.len());
        assert_eq!(read_manifest(dir.path()).unwrap(), *built.manifest());
    }

    #[tokio::test]
    async fn builds_are_counted_by_status() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 32);
        let ok = crate::metrics::tests_support::index_build_count("ok");
        let failed = crate::metrics::tests_support::index_build_count("error");

        store.build(&docs()).await.unwrap();
        assert!(store.build(&[]).await.is_err());

        assert!(crate::metrics::tests_support::index_build_count("ok") > ok);
        assert!(crate::metrics::tests_support::index_build_count("error") > failed);
    }

    #[tokio::test]
    async fn search_ranks_matching_chunk_first() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 256);
        let index = store.build(&docs()).await.unwrap();

        let query = store.embedder().embed_query("time machine").await.unwrap();
        let hits = index.search(&query, 2);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source, "Project Alpha");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_embedding() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 64);

        let err = store.build(&[]).await.unwrap_err();

        assert!(matches!(err, Error::EmptyInput(_)));
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn load_without_index_is_not_found() {
        let dir = tempdir().unwrap();
        let err = store(dir.path(), 64).load().await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("build the index first"));
    }

    #[tokio::test]
    async fn embedder_mismatch_is_invalid_index() {
        let dir = tempdir().unwrap();
        store(dir.path(), 64).build(&docs()).await.unwrap();

        let err = store(dir.path(), 128).load().await.unwrap_err();

        assert!(matches!(err, Error::InvalidIndex(_)));
        assert!(err.to_string().contains("rebuild"));
    }

    #[tokio::test]
    async fn unsupported_version_is_invalid_index() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 64);
        store.build(&docs()).await.unwrap();

        let raw = fs::read_to_string(store.index_path()).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        json["manifest"]["version"] = serde_json::json!(99);
        fs::write(store.index_path(), json.to_string()).unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("unsupported index version 99"));
    }

    #[test]
    fn second_lock_is_refused() {
        let dir = tempdir().unwrap();
        let _first = IndexLock::acquire(dir.path()).unwrap();

        let second = IndexLock::acquire(dir.path());
        assert!(matches!(second, Err(Error::IndexLocked)));
    }

    #[test]
    fn search_truncates_to_top_k() {
        let embedder = crate::index::LocalEmbedder::new(16);
        let chunks = (0..5)
            .map(|i| StoredChunk {
                chunk: Chunk::new(format!("text {i}"), 0, 2, "doc"),
                doc_id: "doc".into(),
                url: None,
                embedding: embedder.embed(&format!("text {i}")),
            })
            .collect();
        let index = VectorIndex {
            manifest: IndexManifest {
                version: INDEX_VERSION,
                built_at: Utc::now(),
                embedder: EmbedBackend::local(16).info(),
                chunk_size: 8,
                chunk_overlap: 0,
                document_count: 1,
                chunk_count: 5,
            },
            chunks,
        };

        assert_eq!(index.search(&embedder.embed("text 3"), 3).len(), 3);
        assert_eq!(index.search(&embedder.embed("text 3"), 10).len(), 5);
    }
}
