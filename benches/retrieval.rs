use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wiki_rag::index::{Chunker, EmbedBackend, IndexStore, LocalEmbedder};
use wiki_rag::sources::{strip_html, Document, SourceKind};
use wiki_rag::RagConfig;

fn chunker_benchmark(c: &mut Criterion) {
    let chunker = Chunker::new(1024, 50);
    let text = "Rust retrieval augmented generation over Wikipedia articles with chunk overlap. "
        .repeat(256);

    c.bench_function("chunker_split_article", |b| {
        b.iter(|| {
            let chunks = chunker.chunk(black_box(text.as_str()), "bench");
            black_box(chunks.len());
        });
    });
}

fn embedder_benchmark(c: &mut Criterion) {
    let embedder = LocalEmbedder::new(256);
    let text = "Graydon Hoare started Rust as a personal project at Mozilla Research in 2006."
        .repeat(16);

    c.bench_function("local_embed_chunk", |b| {
        b.iter(|| black_box(embedder.embed(black_box(&text))));
    });
}

fn search_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = RagConfig::defaults();
    config.storage_dir = dir.path().to_path_buf();
    config.chunk_size = 256;

    let documents: Vec<Document> = (0..200)
        .map(|i| {
            Document::from_text(
                &format!("Article {i}"),
                &format!("Article {i} covers topic {} and subtopic {} in depth. ", i % 17, i % 5).repeat(8),
                SourceKind::Wikipedia,
            )
        })
        .collect();

    let embedder = Arc::new(EmbedBackend::local(256));
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let index = runtime
        .block_on(IndexStore::from_config(&config, embedder).build(&documents))
        .expect("index build");
    let query = LocalEmbedder::new(256).embed("which article covers topic 3 in depth");

    c.bench_function("vector_index_top3", |b| {
        b.iter(|| black_box(index.search(black_box(&query), 3)));
    });
}

fn html_benchmark(c: &mut Criterion) {
    let html = "<h1>Project Alpha</h1><p>Project Alpha is a <b>secret</b> initiative &amp; more.</p>"
        .repeat(64);

    c.bench_function("strip_html_page", |b| {
        b.iter(|| black_box(strip_html(black_box(&html))));
    });
}

criterion_group!(
    benches,
    chunker_benchmark,
    embedder_benchmark,
    search_benchmark,
    html_benchmark
);
criterion_main!(benches);
