//! ngdb-annot - Annotation & Evidence Aggregation Service
//!
//! Orchestrates fetches from external biomedical evidence sources,
//! normalizes classifications into [0,1] weights, and maintains the
//! aggregate kidney gene-disease scores behind an HTTP + SSE API.

use anyhow::Result;
use ngdb_annot::config::AnnotConfig;
use ngdb_annot::AppState;
use ngdb_common::events::EventBus;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting ngdb-annot (Annotation & Evidence Aggregation)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Config: explicit arg > NGDB_ANNOT_CONFIG > ./ngdb-annot.toml > defaults
    let cli_arg = std::env::args().nth(1);
    let config_path = ngdb_common::config::resolve_config_path(
        cli_arg.as_deref(),
        "NGDB_ANNOT_CONFIG",
        "ngdb-annot",
    );

    let config = match &config_path {
        Some(path) => {
            info!("Config: {}", path.display());
            // A broken weight table must stop startup, not default silently
            AnnotConfig::load(path)?
        }
        None => {
            info!("No config file found; using built-in defaults");
            AnnotConfig::default()
        }
    };
    let config_path =
        config_path.unwrap_or_else(|| std::path::PathBuf::from("ngdb-annot.toml"));

    let db_path = ngdb_common::config::resolve_database_path("NGDB_ANNOT_DB", "ngdb-annot");
    info!("Database: {}", db_path.display());
    let db_pool = ngdb_annot::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(db_pool, event_bus, config, config_path);
    let app = ngdb_annot::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{bind_addr}");
    info!("Health check: http://{bind_addr}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
