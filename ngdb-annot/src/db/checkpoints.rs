//! Pipeline checkpoint persistence
//!
//! A single row (id = 1) describes the in-flight run. The orchestrator is
//! the only writer; status handlers read it.

use crate::models::{PipelineCheckpoint, UpdateMode};
use ngdb_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Write or refresh the checkpoint row
pub async fn save_checkpoint(pool: &SqlitePool, checkpoint: &PipelineCheckpoint) -> Result<()> {
    let gene_scope = match &checkpoint.gene_scope {
        Some(scope) => Some(serde_json::to_string(scope).map_err(|e| {
            ngdb_common::Error::Internal(format!("Failed to serialize gene scope: {e}"))
        })?),
        None => None,
    };
    let remaining = serde_json::to_string(&checkpoint.sources_remaining)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to serialize sources: {e}")))?;
    let completed = serde_json::to_string(&checkpoint.sources_completed)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to serialize sources: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO pipeline_checkpoints (
            id, run_id, strategy, gene_scope,
            sources_remaining, sources_completed, started_at, updated_at
        ) VALUES (1, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            run_id = excluded.run_id,
            strategy = excluded.strategy,
            gene_scope = excluded.gene_scope,
            sources_remaining = excluded.sources_remaining,
            sources_completed = excluded.sources_completed,
            started_at = excluded.started_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(checkpoint.run_id.to_string())
    .bind(checkpoint.strategy.as_str())
    .bind(&gene_scope)
    .bind(&remaining)
    .bind(&completed)
    .bind(checkpoint.started_at.to_rfc3339())
    .bind(checkpoint.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Read back the checkpoint, if a run is in flight or was interrupted
pub async fn load_checkpoint(pool: &SqlitePool) -> Result<Option<PipelineCheckpoint>> {
    let row = sqlx::query(
        r#"
        SELECT run_id, strategy, gene_scope, sources_remaining,
               sources_completed, started_at, updated_at
        FROM pipeline_checkpoints WHERE id = 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let run_id: String = row.get("run_id");
    let run_id = Uuid::parse_str(&run_id)
        .map_err(|e| ngdb_common::Error::Internal(format!("Invalid run id: {e}")))?;

    let strategy: String = row.get("strategy");
    let strategy: UpdateMode = strategy
        .parse()
        .map_err(ngdb_common::Error::Internal)?;

    let gene_scope: Option<String> = row.get("gene_scope");
    let gene_scope = match gene_scope {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            ngdb_common::Error::Internal(format!("Failed to deserialize gene scope: {e}"))
        })?),
        None => None,
    };

    let remaining: String = row.get("sources_remaining");
    let completed: String = row.get("sources_completed");
    let started_at: String = row.get("started_at");
    let updated_at: String = row.get("updated_at");

    Ok(Some(PipelineCheckpoint {
        run_id,
        strategy,
        gene_scope,
        sources_remaining: serde_json::from_str(&remaining).map_err(|e| {
            ngdb_common::Error::Internal(format!("Failed to deserialize sources: {e}"))
        })?,
        sources_completed: serde_json::from_str(&completed).map_err(|e| {
            ngdb_common::Error::Internal(format!("Failed to deserialize sources: {e}"))
        })?,
        started_at: super::genes::parse_timestamp(&started_at)?,
        updated_at: super::genes::parse_timestamp(&updated_at)?,
    }))
}

/// Delete the checkpoint after a fully successful run
pub async fn clear_checkpoint(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM pipeline_checkpoints WHERE id = 1")
        .execute(pool)
        .await?;
    Ok(())
}
