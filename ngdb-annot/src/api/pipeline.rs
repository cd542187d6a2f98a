//! Pipeline control and status endpoints

use crate::error::{ApiError, ApiResult};
use crate::models::UpdateMode;
use crate::pipeline::{Pipeline, RunRequest};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub fn pipeline_routes() -> Router<AppState> {
    Router::new()
        .route("/pipeline/update", post(start_update))
        .route("/pipeline/cancel", post(cancel_update))
        .route("/pipeline/status", get(pipeline_status))
        .route("/pipeline/status/:source", get(source_status))
        .route("/pipeline/runs/:run_id", get(run_report))
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    /// Restrict the run to one source id
    source: Option<String>,
    /// "incremental" (default) or "full"
    mode: Option<String>,
    /// Resume the persisted checkpoint if one exists
    #[serde(default)]
    resume: bool,
    /// Restrict the run to these gene ids
    genes: Option<Vec<String>>,
    /// Without an explicit gene list, scope the run to the N
    /// highest-scoring genes
    priority_limit: Option<i64>,
}

/// POST /pipeline/update - start a pipeline run in the background
///
/// Returns 202 with the run id; 409 when a run is already active. The run
/// itself is a spawned task reporting through the status board and the
/// event bus.
async fn start_update(
    State(state): State<AppState>,
    Json(body): Json<UpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let mode: UpdateMode = match body.mode.as_deref() {
        None => UpdateMode::Incremental,
        Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
    };

    if let Some(source) = &body.source {
        if !crate::sources::KNOWN_SOURCES.contains(&source.as_str()) {
            return Err(ApiError::BadRequest(format!("Unknown source: {source}")));
        }
    }

    if !state.pipeline_status.try_begin() {
        return Err(ApiError::Conflict(
            "A pipeline run is already active".to_string(),
        ));
    }

    // A resumed run keeps the checkpoint's original id; report that one
    let run_id = if body.resume {
        match crate::db::checkpoints::load_checkpoint(&state.db).await {
            Ok(Some(checkpoint)) => checkpoint.run_id,
            Ok(None) => Uuid::new_v4(),
            Err(err) => {
                state.pipeline_status.release();
                return Err(err.into());
            }
        }
    } else {
        Uuid::new_v4()
    };

    let cancel = CancellationToken::new();
    *state.run_cancel.write().await = Some(cancel.clone());

    let config = state.config.read().await.clone();
    let pipeline = match Pipeline::new(
        state.db.clone(),
        state.event_bus.clone(),
        state.pipeline_status.clone(),
        &config,
        cancel,
    ) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            state.pipeline_status.release();
            return Err(err.into());
        }
    };

    let request = RunRequest {
        mode,
        source: body.source,
        genes: body.genes,
        priority_limit: body.priority_limit,
        resume: body.resume,
        run_id,
    };

    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        let report = pipeline.run(request).await;
        if let Some(error) = report.sources.iter().find_map(|s| s.error.clone()) {
            *last_error.write().await = Some(error);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "run_id": run_id,
            "strategy": mode.as_str(),
            "resume": body.resume,
        })),
    ))
}

/// POST /pipeline/cancel - request cancellation of the active run
///
/// Cancellation takes effect between sources; in-flight source updates
/// drain first and the checkpoint stays behind for a resume.
async fn cancel_update(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    if !state.pipeline_status.is_running() {
        return Err(ApiError::Conflict("No active pipeline run".to_string()));
    }

    match state.run_cancel.read().await.as_ref() {
        Some(token) => {
            token.cancel();
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "status": "cancellation_requested" })),
            ))
        }
        None => Err(ApiError::Conflict("No active pipeline run".to_string())),
    }
}

/// GET /pipeline/status - whole-pipeline snapshot
async fn pipeline_status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.pipeline_status.snapshot()))
}

/// GET /pipeline/status/:source - one source's live progress, falling back
/// to its most recent audited outcome when no run is active
async fn source_status(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !crate::sources::KNOWN_SOURCES.contains(&source.as_str()) {
        return Err(ApiError::NotFound(format!("Unknown source: {source}")));
    }

    let snapshot = state.pipeline_status.snapshot();
    if let Some(progress) = snapshot.sources.get(&source) {
        return Ok(Json(json!({
            "source": source,
            "phase": snapshot.phase,
            "live": progress,
        })));
    }

    match crate::db::source_runs::latest_for_source(&state.db, &source).await? {
        Some(summary) => Ok(Json(json!({
            "source": source,
            "phase": snapshot.phase,
            "last_run": summary,
        }))),
        None => Err(ApiError::NotFound(format!(
            "No recorded runs for source: {source}"
        ))),
    }
}

/// GET /pipeline/runs/:run_id - per-source outcomes audited for one run
async fn run_report(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run_id: Uuid = run_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid run id: {run_id}")))?;

    let sources = crate::db::source_runs::list_for_run(&state.db, run_id).await?;
    if sources.is_empty() {
        return Err(ApiError::NotFound(format!("No recorded run: {run_id}")));
    }

    Ok(Json(json!({
        "run_id": run_id,
        "sources": sources,
    })))
}
