// Prometheus metrics definitions for the tournament backend.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total HTTP requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tourney_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    pub static ref BRACKETS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "tourney_brackets_created_total",
        "Brackets initialized",
    )
    .unwrap();

    /// Rounds synthesized from completed rounds (round 1 is not counted).
    pub static ref BRACKET_ROUNDS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "tourney_bracket_rounds_created_total",
        "Bracket rounds derived from winners",
    )
    .unwrap();

    pub static ref ROOMS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "tourney_rooms_created_total",
        "Rooms opened for bracket matches",
    )
    .unwrap();

    /// Bans applied, by where the draft lives (room or session).
    pub static ref DRAFT_BANS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tourney_draft_bans_total", "Titles banned"),
        &["scope"],
    )
    .unwrap();

    pub static ref DRAFTS_RESOLVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tourney_drafts_resolved_total", "Drafts narrowed to one title"),
        &["scope"],
    )
    .unwrap();

    /// Writes rejected by the optimistic version check, by entity.
    pub static ref STALE_WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tourney_stale_writes_total", "Writes rejected as stale"),
        &["entity"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "tourney_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(BRACKETS_CREATED_TOTAL.clone()),
        Box::new(BRACKET_ROUNDS_CREATED_TOTAL.clone()),
        Box::new(ROOMS_CREATED_TOTAL.clone()),
        Box::new(DRAFT_BANS_TOTAL.clone()),
        Box::new(DRAFTS_RESOLVED_TOTAL.clone()),
        Box::new(STALE_WRITES_TOTAL.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: replace numeric segments (ids, room
/// codes), UUIDs and bracket/match ids with `:id` to bound cardinality.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_identifier(segment) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_identifier(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    if segment.parse::<i64>().is_ok() || uuid::Uuid::parse_str(segment).is_ok() {
        return true;
    }
    // B001, R1-M002
    let bytes = segment.as_bytes();
    (bytes[0] == b'B' || bytes[0] == b'R')
        && segment[1..].chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Middleware recording request count and latency.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = normalize_path(req.uri().path());
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), status.as_str()])
        .inc();
    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}
