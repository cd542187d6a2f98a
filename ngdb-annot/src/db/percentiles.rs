//! Percentile cache persistence
//!
//! TTL enforcement happens in the percentile service; this module only
//! stores and loads entries with their computation timestamp.

use chrono::{DateTime, Utc};
use ngdb_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

/// Store the gene→percentile mapping for one score field
pub async fn save_cache_entry(
    pool: &SqlitePool,
    score_field: &str,
    mapping: &HashMap<String, f64>,
    computed_at: DateTime<Utc>,
) -> Result<()> {
    let json = serde_json::to_string(mapping)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to serialize mapping: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO percentile_cache (score_field, mapping, computed_at)
        VALUES (?, ?, ?)
        ON CONFLICT(score_field) DO UPDATE SET
            mapping = excluded.mapping,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(score_field)
    .bind(&json)
    .bind(computed_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a cache entry with its age; freshness is the caller's decision
pub async fn load_cache_entry(
    pool: &SqlitePool,
    score_field: &str,
) -> Result<Option<(HashMap<String, f64>, DateTime<Utc>)>> {
    let row = sqlx::query("SELECT mapping, computed_at FROM percentile_cache WHERE score_field = ?")
        .bind(score_field)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mapping: String = row.get("mapping");
    let mapping: HashMap<String, f64> = serde_json::from_str(&mapping)
        .map_err(|e| ngdb_common::Error::Internal(format!("Failed to deserialize mapping: {e}")))?;
    let computed_at: String = row.get("computed_at");

    Ok(Some((mapping, super::genes::parse_timestamp(&computed_at)?)))
}
