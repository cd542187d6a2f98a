//! Percentile cache refresh endpoint

use crate::error::{ApiError, ApiResult};
use crate::scoring::PercentileService;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use ngdb_common::events::AnnotEvent;
use serde::Deserialize;
use serde_json::json;

pub fn percentile_routes() -> Router<AppState> {
    Router::new().route("/percentiles/refresh", post(refresh_percentiles))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    score_field: String,
}

/// POST /percentiles/refresh - schedule a recompute of one score field's
/// percentiles
///
/// Returns 202 immediately; the recompute runs as a background task and
/// announces its outcome on the event bus.
async fn refresh_percentiles(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.score_field.trim().is_empty() {
        return Err(ApiError::BadRequest("score_field is required".to_string()));
    }

    let ttl = state.config.read().await.percentile.cache_ttl_seconds;
    let service = PercentileService::new(state.db.clone(), ttl);
    let event_bus = state.event_bus.clone();
    let score_field = body.score_field.clone();

    tokio::spawn(async move {
        match service.refresh(&score_field).await {
            Ok(Some(mapping)) => {
                event_bus.emit_lossy(AnnotEvent::PercentilesRefreshed {
                    score_field,
                    population: mapping.len(),
                    timestamp: chrono::Utc::now(),
                });
            }
            Ok(None) => {
                tracing::warn!(%score_field, "Percentile refresh found no ranked population");
            }
            Err(err) => {
                tracing::error!(%score_field, %err, "Percentile refresh failed");
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "scheduled",
            "score_field": body.score_field,
        })),
    ))
}
