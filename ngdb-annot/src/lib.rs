//! ngdb-annot library interface
//!
//! Exposes the annotation pipeline, scoring layer, and HTTP API for
//! integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod resilience;
pub mod scoring;
pub mod sources;

pub use crate::error::{ApiError, ApiResult};

use crate::config::AnnotConfig;
use crate::pipeline::PipelineStatus;
use axum::Router;
use chrono::{DateTime, Utc};
use ngdb_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Live configuration, swapped atomically on validated reload
    pub config: Arc<RwLock<AnnotConfig>>,
    /// Path the reload endpoint re-reads
    pub config_path: Arc<PathBuf>,
    /// Status board and single-run guard for the pipeline
    pub pipeline_status: Arc<PipelineStatus>,
    /// Cancellation token of the active run, if any
    pub run_cancel: Arc<RwLock<Option<CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pipeline error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: AnnotConfig,
        config_path: PathBuf,
    ) -> Self {
        Self {
            db,
            event_bus,
            config: Arc::new(RwLock::new(config)),
            config_path: Arc::new(config_path),
            pipeline_status: Arc::new(PipelineStatus::new()),
            run_cancel: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::pipeline_routes())
        .merge(api::score_routes())
        .merge(api::percentile_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
