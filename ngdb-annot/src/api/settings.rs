//! Configuration reload endpoint

use crate::config::AnnotConfig;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde_json::json;

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/config/reload", post(reload_config))
}

/// POST /config/reload - re-read and validate the config file
///
/// The new configuration is swapped in only after validation succeeds; a
/// broken file on disk leaves the running configuration untouched.
async fn reload_config(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let reloaded = AnnotConfig::load(&state.config_path)
        .map_err(|e| ApiError::BadRequest(format!("Config rejected: {e}")))?;

    let active_sources = reloaded.active_source_count();
    *state.config.write().await = reloaded;

    tracing::info!(
        path = %state.config_path.display(),
        active_sources,
        "Configuration reloaded"
    );

    Ok(Json(json!({
        "status": "reloaded",
        "active_sources": active_sources,
    })))
}
