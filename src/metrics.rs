//! Prometheus metrics for corpus builds and queries.
//!
//! Build stages and queries are timed per [`Stage`]; collaborator failures
//! absorbed by a fallback are counted per [`Collaborator`]; the sizes of the
//! last build are kept as gauges. CLI invocations have their own counter.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

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
    default_registry, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::semrag::store::Manifest;

/// Timed unit of work in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chunk,
    Graph,
    Summarize,
    Build,
    Query,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Chunk => "chunk",
            Stage::Graph => "graph",
            Stage::Summarize => "summarize",
            Stage::Build => "build",
            Stage::Query => "query",
        }
    }
}

/// External dependency whose failure is replaced by a degraded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Embedder,
    EntityExtractor,
    CommunityDetector,
    RelevanceScorer,
    Generator,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collaborator::Embedder => "embedder",
            Collaborator::EntityExtractor => "entity_extractor",
            Collaborator::CommunityDetector => "community_detector",
            Collaborator::RelevanceScorer => "relevance_scorer",
            Collaborator::Generator => "generator",
        }
    }
}

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // 5ms (a query against the local embedder) up to ~12 minutes (a build
    // against a remote embedder).
    let buckets =
        prometheus::exponential_buckets(0.005, 2.5, 14).expect("valid histogram buckets");
    register_histogram_vec!(
        "semrag_stage_duration_seconds",
        "Time spent in a build stage or answering a query",
        &["stage"],
        buckets
    )
    .expect("failed to register stage duration histogram")
});

static STAGE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semrag_stage_total",
        "Build stages and queries run, by outcome",
        &["stage", "status"]
    )
    .expect("failed to register stage counter")
});

static STAGE_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "semrag_stage_inflight",
        "Build stages and queries currently running",
        &["stage"]
    )
    .expect("failed to register inflight gauge")
});

static DEGRADED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semrag_degraded_total",
        "Collaborator failures replaced by a fallback result",
        &["collaborator"]
    )
    .expect("failed to register degraded counter")
});

static ARTIFACT_ITEMS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "semrag_artifact_items",
        "Item counts of the most recent build",
        &["artifact"]
    )
    .expect("failed to register artifact gauge")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "semrag_command_total",
        "CLI commands run, by outcome",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&STAGE_DURATION);
    Lazy::force(&STAGE_TOTAL);
    Lazy::force(&STAGE_INFLIGHT);
    Lazy::force(&DEGRADED_TOTAL);
    Lazy::force(&ARTIFACT_ITEMS);
    Lazy::force(&COMMAND_TOTAL);
}

fn status(success: bool) -> &'static str {
    if success {
        "ok"
    } else {
        "error"
    }
}

/// Run `fut` as `stage`, recording inflight, duration and outcome.
pub async fn timed<T, E, F>(stage: Stage, fut: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    init_collectors();
    let label = [stage.as_str()];
    STAGE_INFLIGHT.with_label_values(&label).inc();
    let started = Instant::now();

    let result = fut.await;

    STAGE_INFLIGHT.with_label_values(&label).dec();
    STAGE_DURATION
        .with_label_values(&label)
        .observe(started.elapsed().as_secs_f64());
    STAGE_TOTAL
        .with_label_values(&[stage.as_str(), status(result.is_ok())])
        .inc();
    result
}

pub fn record_degraded(collaborator: Collaborator) {
    init_collectors();
    DEGRADED_TOTAL
        .with_label_values(&[collaborator.as_str()])
        .inc();
}

/// Publish the sizes written to `manifest.json`.
pub fn record_build(manifest: &Manifest) {
    init_collectors();
    let sizes = [
        ("chunks", manifest.chunk_count),
        ("nodes", manifest.node_count),
        ("edges", manifest.edge_count),
        ("communities", manifest.community_count),
        ("summaries", manifest.summary_count),
    ];
    for (artifact, count) in sizes {
        ARTIFACT_ITEMS
            .with_label_values(&[artifact])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Count one CLI invocation. Durations live on the stage histogram.
pub fn record_command(command: &'static str, elapsed: Duration, success: bool) {
    init_collectors();
    COMMAND_TOTAL
        .with_label_values(&[command, status(success)])
        .inc();
    info!(command, elapsed_ms = elapsed.as_millis() as u64, success, "Command finished");
}

fn plain_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "encode error",
        ));
    }

    let mut response = plain_response(StatusCode::OK, buffer);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving /metrics");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Expose `/metrics` on `addr` for the lifetime of the process. Useful for
/// long `build` runs and `chat` sessions.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
