//! Evidence record table operations
//!
//! Each source's update routine is the sole writer of its own rows; there
//! are no cross-source write conflicts by construction.

use crate::models::EvidenceRecord;
use ngdb_common::Result;
use sqlx::{Row, SqlitePool};

/// Insert or replace the single evidence row for (gene, source)
pub async fn upsert_evidence(pool: &SqlitePool, record: &EvidenceRecord) -> Result<()> {
    let payload = serde_json::to_string(&record.raw_payload)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to serialize payload: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO evidence_records (hgnc_id, source_id, raw_payload, normalized_weight, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(hgnc_id, source_id) DO UPDATE SET
            raw_payload = excluded.raw_payload,
            normalized_weight = excluded.normalized_weight,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.hgnc_id)
    .bind(&record.source_id)
    .bind(&payload)
    .bind(record.normalized_weight)
    .bind(record.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete all of a source's evidence rows (full-mode repopulation).
///
/// Returns the number of rows removed so run reports can surface how much
/// stale evidence a full refresh actually cleared.
pub async fn delete_source_evidence(pool: &SqlitePool, source_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM evidence_records WHERE source_id = ?")
        .bind(source_id)
        .execute(pool)
        .await?;

    // The source's ranking view rows go with it
    sqlx::query("DELETE FROM score_views WHERE source_id = ?")
        .bind(source_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Fetch one evidence row
pub async fn get_evidence(
    pool: &SqlitePool,
    hgnc_id: &str,
    source_id: &str,
) -> Result<Option<EvidenceRecord>> {
    let row = sqlx::query(
        r#"
        SELECT hgnc_id, source_id, raw_payload, normalized_weight, updated_at
        FROM evidence_records
        WHERE hgnc_id = ? AND source_id = ?
        "#,
    )
    .bind(hgnc_id)
    .bind(source_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let payload: String = row.get("raw_payload");
            let raw_payload = serde_json::from_str(&payload).map_err(|e| {
                ngdb_common::Error::Internal(format!("Failed to deserialize payload: {e}"))
            })?;
            let updated_at: String = row.get("updated_at");

            Ok(Some(EvidenceRecord {
                hgnc_id: row.get("hgnc_id"),
                source_id: row.get("source_id"),
                raw_payload,
                normalized_weight: row.get("normalized_weight"),
                updated_at: super::genes::parse_timestamp(&updated_at)?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn count_for_source(pool: &SqlitePool, source_id: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM evidence_records WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Per-gene weight sums over all evidence rows, the aggregator's input
pub async fn sum_weights_by_gene(pool: &SqlitePool) -> Result<Vec<(String, f64, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT hgnc_id, SUM(normalized_weight) AS raw_score, COUNT(*) AS source_count
        FROM evidence_records
        GROUP BY hgnc_id
        ORDER BY hgnc_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<String, _>("hgnc_id"),
                row.get::<f64, _>("raw_score"),
                row.get::<i64, _>("source_count"),
            )
        })
        .collect())
}

/// Overwrite the normalized weight of one evidence row.
///
/// Used by the global recompute to resolve rank-based sources once their
/// percentile is known; payload and timestamp stay untouched so the write
/// is idempotent under identical inputs.
pub async fn set_normalized_weight(
    pool: &SqlitePool,
    hgnc_id: &str,
    source_id: &str,
    weight: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE evidence_records SET normalized_weight = ? WHERE hgnc_id = ? AND source_id = ?",
    )
    .bind(weight)
    .bind(hgnc_id)
    .bind(source_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write a (log-transformed) rankable value into the population view
pub async fn upsert_score_view(
    pool: &SqlitePool,
    source_id: &str,
    hgnc_id: &str,
    score_field: &str,
    value: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO score_views (source_id, hgnc_id, score_field, value, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(hgnc_id, score_field) DO UPDATE SET
            source_id = excluded.source_id,
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(source_id)
    .bind(hgnc_id)
    .bind(score_field)
    .bind(value)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// All values of one score field across the population
pub async fn load_score_view(pool: &SqlitePool, score_field: &str) -> Result<Vec<(String, f64)>> {
    let rows = sqlx::query(
        "SELECT hgnc_id, value FROM score_views WHERE score_field = ? ORDER BY hgnc_id",
    )
    .bind(score_field)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("hgnc_id"), row.get::<f64, _>("value")))
        .collect())
}
