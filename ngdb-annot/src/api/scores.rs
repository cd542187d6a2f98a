//! Aggregate score read endpoints
//!
//! Display thresholds are applied here, and only here: evidence below the
//! configured cutoff is hidden from listings but never removed.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn score_routes() -> Router<AppState> {
    Router::new()
        .route("/scores", get(list_scores))
        .route("/scores/:hgnc_id", get(get_score))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    /// Override the configured display cutoff
    min_percentage: Option<f64>,
    limit: Option<i64>,
}

/// GET /scores - ranked gene listing above the display cutoff
async fn list_scores(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let min_percentage = match query.min_percentage {
        Some(value) => value,
        None => state.config.read().await.display.min_percentage_score,
    };
    let limit = query.limit.unwrap_or(100).clamp(1, 10_000);

    let scores = crate::db::scores::list_scores(&state.db, min_percentage, limit).await?;
    Ok(Json(json!({
        "min_percentage": min_percentage,
        "count": scores.len(),
        "scores": scores,
    })))
}

/// GET /scores/:hgnc_id - one gene's aggregate score with its percentiles
async fn get_score(
    State(state): State<AppState>,
    Path(hgnc_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    match crate::db::scores::get_score(&state.db, &hgnc_id).await? {
        Some(score) => Ok(Json(score)),
        None => Err(ApiError::NotFound(format!(
            "No aggregate score for gene: {hgnc_id}"
        ))),
    }
}
