//! Source run audit rows backing the status API

use crate::models::{SourceRunStatus, SourceRunSummary};
use chrono::Utc;
use ngdb_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Record one source's outcome within a run
pub async fn record_result(
    pool: &SqlitePool,
    run_id: Uuid,
    summary: &SourceRunSummary,
) -> Result<()> {
    let sampled = serde_json::to_string(&summary.sampled_failures)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to serialize failures: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO source_runs (
            run_id, source_id, status, genes_updated, genes_failed,
            records_deleted, sampled_failures, error, finished_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(run_id, source_id) DO UPDATE SET
            status = excluded.status,
            genes_updated = excluded.genes_updated,
            genes_failed = excluded.genes_failed,
            records_deleted = excluded.records_deleted,
            sampled_failures = excluded.sampled_failures,
            error = excluded.error,
            finished_at = excluded.finished_at
        "#,
    )
    .bind(run_id.to_string())
    .bind(&summary.source)
    .bind(summary.status.as_str())
    .bind(summary.genes_updated as i64)
    .bind(summary.genes_failed as i64)
    .bind(summary.records_deleted as i64)
    .bind(&sampled)
    .bind(&summary.error)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent outcome for one source, across runs
pub async fn latest_for_source(
    pool: &SqlitePool,
    source_id: &str,
) -> Result<Option<SourceRunSummary>> {
    let row = sqlx::query(
        r#"
        SELECT source_id, status, genes_updated, genes_failed,
               records_deleted, sampled_failures, error
        FROM source_runs
        WHERE source_id = ?
        ORDER BY finished_at DESC
        LIMIT 1
        "#,
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_summary(&row)?)),
        None => Ok(None),
    }
}

/// All outcomes recorded for one run
pub async fn list_for_run(pool: &SqlitePool, run_id: Uuid) -> Result<Vec<SourceRunSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT source_id, status, genes_updated, genes_failed,
               records_deleted, sampled_failures, error
        FROM source_runs
        WHERE run_id = ?
        ORDER BY source_id
        "#,
    )
    .bind(run_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_summary).collect()
}

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<SourceRunSummary> {
    let status: String = row.get("status");
    let status: SourceRunStatus = status.parse().map_err(ngdb_common::Error::Internal)?;
    let sampled: String = row.get("sampled_failures");
    let sampled_failures: Vec<String> = serde_json::from_str(&sampled)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to deserialize failures: {e}")))?;

    Ok(SourceRunSummary {
        source: row.get("source_id"),
        status,
        genes_updated: row.get::<i64, _>("genes_updated") as usize,
        genes_failed: row.get::<i64, _>("genes_failed") as usize,
        records_deleted: row.get::<i64, _>("records_deleted") as usize,
        sampled_failures,
        error: row.get("error"),
    })
}
