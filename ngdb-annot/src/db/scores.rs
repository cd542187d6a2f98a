//! Aggregate score table operations
//!
//! Derived state only: every row here can be rebuilt from evidence_records
//! at any time.

use crate::models::AggregateScore;
use ngdb_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// Replace all aggregate score rows in one transaction.
///
/// The whole-population recompute runs once per pipeline run; a transaction
/// keeps readers from observing a half-written population.
pub async fn replace_aggregate_scores(
    pool: &SqlitePool,
    scores: &[AggregateScore],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM aggregate_scores")
        .execute(&mut *tx)
        .await?;

    for score in scores {
        let percentiles = serde_json::to_string(&score.percentiles).map_err(|e| {
            ngdb_common::Error::Internal(format!("Failed to serialize percentiles: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO aggregate_scores (
                hgnc_id, raw_score, percentage_score, source_count, percentiles, computed_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&score.hgnc_id)
        .bind(score.raw_score)
        .bind(score.percentage_score)
        .bind(score.source_count)
        .bind(&percentiles)
        .bind(score.computed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Fetch one gene's aggregate score
pub async fn get_score(pool: &SqlitePool, hgnc_id: &str) -> Result<Option<AggregateScore>> {
    let row = sqlx::query(
        r#"
        SELECT hgnc_id, raw_score, percentage_score, source_count, percentiles, computed_at
        FROM aggregate_scores WHERE hgnc_id = ?
        "#,
    )
    .bind(hgnc_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_score(&row)?)),
        None => Ok(None),
    }
}

/// List scores, strongest first.
///
/// `min_percentage` is a display filter: rows below it are hidden from this
/// listing but fully retained in the database.
pub async fn list_scores(
    pool: &SqlitePool,
    min_percentage: f64,
    limit: i64,
) -> Result<Vec<AggregateScore>> {
    let rows = sqlx::query(
        r#"
        SELECT hgnc_id, raw_score, percentage_score, source_count, percentiles, computed_at
        FROM aggregate_scores
        WHERE percentage_score >= ?
        ORDER BY raw_score DESC, hgnc_id
        LIMIT ?
        "#,
    )
    .bind(min_percentage)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_score).collect()
}

fn row_to_score(row: &sqlx::sqlite::SqliteRow) -> Result<AggregateScore> {
    let percentiles: String = row.get("percentiles");
    let percentiles: HashMap<String, f64> = serde_json::from_str(&percentiles).map_err(|e| {
        ngdb_common::Error::Internal(format!("Failed to deserialize percentiles: {e}"))
    })?;
    let computed_at: String = row.get("computed_at");

    Ok(AggregateScore {
        hgnc_id: row.get("hgnc_id"),
        raw_score: row.get("raw_score"),
        percentage_score: row.get("percentage_score"),
        source_count: row.get("source_count"),
        percentiles,
        computed_at: super::genes::parse_timestamp(&computed_at)?,
    })
}
