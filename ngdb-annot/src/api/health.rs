//! Health and diagnostics endpoint

use crate::AppState;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /health - service metadata, uptime, and last pipeline error
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_seconds = (chrono::Utc::now() - state.startup_time).num_seconds();
    let last_error = state.last_error.read().await.clone();

    Json(json!({
        "service": "ngdb-annot",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "uptime_seconds": uptime_seconds,
        "pipeline_running": state.pipeline_status.is_running(),
        "last_error": last_error,
    }))
}
