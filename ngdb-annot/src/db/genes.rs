//! Gene table operations

use crate::models::GeneRecord;
use chrono::Utc;
use ngdb_common::Result;
use sqlx::{Row, SqlitePool};

/// Insert or refresh a gene.
///
/// Identity (`hgnc_id`) is immutable; display fields are refreshed on
/// conflict, `created_at` is kept.
pub async fn upsert_gene(pool: &SqlitePool, gene: &GeneRecord) -> Result<()> {
    let aliases = serde_json::to_string(&gene.aliases)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to serialize aliases: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO genes (hgnc_id, symbol, name, aliases, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(hgnc_id) DO UPDATE SET
            symbol = excluded.symbol,
            name = excluded.name,
            aliases = excluded.aliases,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&gene.hgnc_id)
    .bind(&gene.symbol)
    .bind(&gene.name)
    .bind(&aliases)
    .bind(gene.created_at.to_rfc3339())
    .bind(gene.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a gene by its stable identifier
pub async fn get_gene(pool: &SqlitePool, hgnc_id: &str) -> Result<Option<GeneRecord>> {
    let row = sqlx::query(
        "SELECT hgnc_id, symbol, name, aliases, created_at, updated_at FROM genes WHERE hgnc_id = ?",
    )
    .bind(hgnc_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_gene(&row)?)),
        None => Ok(None),
    }
}

/// Resolve an approved symbol to its gene id
pub async fn resolve_symbol(pool: &SqlitePool, symbol: &str) -> Result<Option<String>> {
    let id: Option<String> = sqlx::query_scalar("SELECT hgnc_id FROM genes WHERE symbol = ?")
        .bind(symbol)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// (hgnc_id, symbol) pairs, restricted to `scope` when given
pub async fn list_symbols(
    pool: &SqlitePool,
    scope: Option<&[String]>,
) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query("SELECT hgnc_id, symbol FROM genes ORDER BY hgnc_id")
        .fetch_all(pool)
        .await?;

    let mut pairs: Vec<(String, String)> = rows
        .iter()
        .map(|row| (row.get::<String, _>("hgnc_id"), row.get::<String, _>("symbol")))
        .collect();

    if let Some(scope) = scope {
        let wanted: std::collections::HashSet<&str> = scope.iter().map(String::as_str).collect();
        pairs.retain(|(id, _)| wanted.contains(id.as_str()));
    }

    Ok(pairs)
}

pub async fn count_genes(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM genes")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Gene ids ordered by existing evidence score, strongest first.
///
/// Used to prioritize the scope of incremental runs: genes that already
/// carry evidence are the ones most likely to have provider-side changes
/// worth refreshing.
pub async fn gene_ids_by_priority(pool: &SqlitePool, limit: i64) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT g.hgnc_id FROM genes g
        LEFT JOIN aggregate_scores s ON s.hgnc_id = g.hgnc_id
        ORDER BY COALESCE(s.raw_score, 0.0) DESC, g.hgnc_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Stage a symbol the identity source could not match exactly.
///
/// The manual review workflow consumes this table; the pipeline only
/// writes candidates and never resolves them itself.
pub async fn stage_symbol_candidate(
    pool: &SqlitePool,
    reported_symbol: &str,
    candidate_hgnc_id: Option<&str>,
    source_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO symbol_stage (reported_symbol, candidate_hgnc_id, source_id, staged_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(reported_symbol) DO UPDATE SET
            candidate_hgnc_id = excluded.candidate_hgnc_id,
            source_id = excluded.source_id,
            staged_at = excluded.staged_at
        "#,
    )
    .bind(reported_symbol)
    .bind(candidate_hgnc_id)
    .bind(source_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_gene(row: &sqlx::sqlite::SqliteRow) -> Result<GeneRecord> {
    let aliases: String = row.get("aliases");
    let aliases: Vec<String> = serde_json::from_str(&aliases)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to deserialize aliases: {e}")))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(GeneRecord {
        hgnc_id: row.get("hgnc_id"),
        symbol: row.get("symbol"),
        name: row.get("name"),
        aliases,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| ngdb_common::Error::Internal(format!("Invalid timestamp '{value}': {e}")))
}
