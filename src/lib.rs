// Tournament backend: bracket progression, match rooms and map-ban drafts.

pub mod api;
pub mod auth;
pub mod bracket;
pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod metrics;
pub mod room;

use axum::{http::header, response::IntoResponse, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use api::AppState;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "tourney-backend" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// The full HTTP application: API routes plus health, metrics and middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(api::router(state))
        .layer(axum::middleware::from_fn(metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
