//! Prometheus metrics for the wiki_rag CLI.
//!
//! Command level:
//! - `wiki_rag_command_duration_seconds` (histogram)
//! - `wiki_rag_command_total` (counter with status)
//! - `wiki_rag_command_inflight` (gauge)
//!
//! Pipeline level:
//! - `wiki_rag_answers_total` (counter by mode and outcome)
//! - `wiki_rag_answer_duration_seconds` (histogram by mode)
//! - `wiki_rag_condense_total` (counter by outcome)
//! - `wiki_rag_retrieval_duration_seconds` (histogram)
//! - `wiki_rag_index_builds_total` (counter with status)
//! - `wiki_rag_index_build_duration_seconds` (histogram)
//! - `wiki_rag_index_documents` / `wiki_rag_index_chunks` (gauges, last built or loaded index)
//!
//! plus process metrics via the `process` collector.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram, register_histogram_vec, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Encoder, Histogram, HistogramVec, IntCounterVec,
    IntGauge, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // 50ms up to ~7 minutes; index builds over many articles are slow.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "wiki_rag_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wiki_rag_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "wiki_rag_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static ANSWERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wiki_rag_answers_total",
        "Questions answered by the conversational pipeline",
        &["mode", "outcome"]
    )
    .expect("failed to register answers counter")
});

static ANSWER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // 100ms up to ~7 minutes; local models on CPU are slow.
    let buckets =
        prometheus::exponential_buckets(0.1, 2.0, 13).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "wiki_rag_answer_duration_seconds",
        "Time from question to final answer fragment",
        &["mode"],
        buckets
    )
    .expect("failed to register answer duration histogram")
});

static CONDENSE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wiki_rag_condense_total",
        "Follow-up condensation attempts by outcome",
        &["outcome"]
    )
    .expect("failed to register condense counter")
});

static RETRIEVAL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.005, 2.0, 12).expect("failed to create histogram buckets");
    register_histogram!(
        "wiki_rag_retrieval_duration_seconds",
        "Question embedding plus similarity search",
        buckets
    )
    .expect("failed to register retrieval histogram")
});

static INDEX_BUILDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wiki_rag_index_builds_total",
        "Index builds by status",
        &["status"]
    )
    .expect("failed to register index build counter")
});

static INDEX_BUILD_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram!(
        "wiki_rag_index_build_duration_seconds",
        "Chunking, embedding and persisting an index",
        buckets
    )
    .expect("failed to register index build histogram")
});

static INDEX_DOCUMENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("wiki_rag_index_documents", "Documents in the current index")
        .expect("failed to register index documents gauge")
});

static INDEX_CHUNKS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("wiki_rag_index_chunks", "Chunks in the current index")
        .expect("failed to register index chunks gauge")
});

fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&ANSWERS_TOTAL);
    Lazy::force(&ANSWER_DURATION);
    Lazy::force(&CONDENSE_TOTAL);
    Lazy::force(&RETRIEVAL_DURATION);
    Lazy::force(&INDEX_BUILDS_TOTAL);
    Lazy::force(&INDEX_BUILD_DURATION);
    Lazy::force(&INDEX_DOCUMENTS);
    Lazy::force(&INDEX_CHUNKS);
}

/// How an answer was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerMode {
    Blocking,
    Stream,
}

impl AnswerMode {
    fn label(self) -> &'static str {
        match self {
            AnswerMode::Blocking => "blocking",
            AnswerMode::Stream => "stream",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Full answer produced and recorded in history.
    Answered,
    Failed,
    /// Stream dropped before its last fragment.
    Abandoned,
}

impl AnswerOutcome {
    fn label(self) -> &'static str {
        match self {
            AnswerOutcome::Answered => "answered",
            AnswerOutcome::Failed => "failed",
            AnswerOutcome::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondenseOutcome {
    /// No history, the model was not called.
    Skipped,
    Unchanged,
    Rewritten,
    Failed,
}

impl CondenseOutcome {
    fn label(self) -> &'static str {
        match self {
            CondenseOutcome::Skipped => "skipped",
            CondenseOutcome::Unchanged => "unchanged",
            CondenseOutcome::Rewritten => "rewritten",
            CondenseOutcome::Failed => "failed",
        }
    }
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

/// Record one finished (or given up) question.
pub fn record_answer(mode: AnswerMode, outcome: AnswerOutcome, duration: Duration) {
    ANSWERS_TOTAL
        .with_label_values(&[mode.label(), outcome.label()])
        .inc();
    if outcome == AnswerOutcome::Answered {
        ANSWER_DURATION
            .with_label_values(&[mode.label()])
            .observe(duration.as_secs_f64());
    }
}

pub fn record_condense(outcome: CondenseOutcome) {
    CONDENSE_TOTAL.with_label_values(&[outcome.label()]).inc();
}

pub fn record_retrieval(duration: Duration) {
    RETRIEVAL_DURATION.observe(duration.as_secs_f64());
}

/// Record an index build; sizes are only meaningful on success.
pub fn record_index_build(duration: Duration, documents: usize, chunks: usize, success: bool) {
    INDEX_BUILDS_TOTAL
        .with_label_values(&[if success { "ok" } else { "error" }])
        .inc();
    INDEX_BUILD_DURATION.observe(duration.as_secs_f64());
    if success {
        record_index_size(documents, chunks);
    }
}

/// Size of the index currently served.
pub fn record_index_size(documents: usize, chunks: usize) {
    INDEX_DOCUMENTS.set(i64::try_from(documents).unwrap_or(i64::MAX));
    INDEX_CHUNKS.set(i64::try_from(chunks).unwrap_or(i64::MAX));
}

fn plain(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain(StatusCode::INTERNAL_SERVER_ERROR, "encode error"));
    }

    let mut response = plain(StatusCode::OK, buffer);
    if let Ok(value) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
