//! Database access for ngdb-annot
//!
//! One SQLite database owned by this service. Evidence tables are written
//! only by their source's update routine; aggregate and percentile tables
//! are derived state, safe to drop and rebuild.

pub mod checkpoints;
pub mod evidence;
pub mod genes;
pub mod percentiles;
pub mod scores;
pub mod source_runs;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool and create tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create annotation pipeline tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS genes (
            hgnc_id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            aliases TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence_records (
            hgnc_id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            raw_payload TEXT NOT NULL,
            normalized_weight REAL NOT NULL DEFAULT 0.0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (hgnc_id, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pre-aggregated population view for percentile ranking. Sources with
    // rankable score fields write (already log-transformed) values here
    // alongside their evidence rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS score_views (
            source_id TEXT NOT NULL,
            hgnc_id TEXT NOT NULL,
            score_field TEXT NOT NULL,
            value REAL NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (hgnc_id, score_field)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aggregate_scores (
            hgnc_id TEXT PRIMARY KEY,
            raw_score REAL NOT NULL,
            percentage_score REAL NOT NULL,
            source_count INTEGER NOT NULL,
            percentiles TEXT NOT NULL DEFAULT '{}',
            computed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-row table: at most one pipeline run is in flight per process
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_checkpoints (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            run_id TEXT NOT NULL,
            strategy TEXT NOT NULL,
            gene_scope TEXT,
            sources_remaining TEXT NOT NULL,
            sources_completed TEXT NOT NULL,
            started_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS percentile_cache (
            score_field TEXT PRIMARY KEY,
            mapping TEXT NOT NULL,
            computed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_runs (
            run_id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            status TEXT NOT NULL,
            genes_updated INTEGER NOT NULL DEFAULT 0,
            genes_failed INTEGER NOT NULL DEFAULT 0,
            records_deleted INTEGER NOT NULL DEFAULT 0,
            sampled_failures TEXT NOT NULL DEFAULT '[]',
            error TEXT,
            finished_at TEXT NOT NULL,
            PRIMARY KEY (run_id, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Staging area for fuzzy symbol matches awaiting external review.
    // This service only writes candidates; resolution happens elsewhere.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS symbol_stage (
            reported_symbol TEXT PRIMARY KEY,
            candidate_hgnc_id TEXT,
            source_id TEXT NOT NULL,
            staged_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}
