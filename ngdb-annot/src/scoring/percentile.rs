//! Percentile service
//!
//! Computes and caches the global rank-percentile of a continuous score
//! across the gene population. Resolution is three-tiered: a fresh cache
//! entry, else a recompute from the pre-aggregated score view, else an
//! explicit "unknown". A gene with no percentile is reported as not yet
//! ranked — never as the misleading maximum.

use chrono::{Duration, Utc};
use ngdb_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Average-rank percentiles over `values`, in (0,1).
///
/// Tied raw scores receive identical, averaged percentiles. Uses the
/// Hazen plotting position (rank - 0.5) / n, which puts a population of
/// one at 0.5 rather than 1.0.
pub fn compute_percentiles(values: &[(String, f64)]) -> HashMap<String, f64> {
    let n = values.len();
    if n == 0 {
        return HashMap::new();
    }

    let mut sorted: Vec<(&str, f64)> = values
        .iter()
        .map(|(id, value)| (id.as_str(), *value))
        .collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut percentiles = HashMap::with_capacity(n);
    let mut index = 0;
    while index < n {
        // Extend over the tie group sharing this value
        let mut end = index + 1;
        while end < n && sorted[end].1 == sorted[index].1 {
            end += 1;
        }

        // 1-based ranks index+1 ..= end, averaged over the group
        let average_rank = (index + 1 + end) as f64 / 2.0;
        let percentile = (average_rank - 0.5) / n as f64;

        for entry in &sorted[index..end] {
            percentiles.insert(entry.0.to_string(), percentile);
        }

        index = end;
    }

    percentiles
}

pub struct PercentileService {
    db: SqlitePool,
    ttl: Duration,
}

impl PercentileService {
    pub fn new(db: SqlitePool, cache_ttl_seconds: i64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(cache_ttl_seconds),
        }
    }

    /// Resolve the gene→percentile mapping for one score field.
    ///
    /// Tier 1: cached mapping, if younger than the TTL. Tier 2: recompute
    /// from the score view and repopulate the cache. Tier 3: `None` — the
    /// population has no values yet (first-ever run), logged once per call
    /// rather than per gene.
    pub async fn get_percentiles(&self, score_field: &str) -> Result<Option<HashMap<String, f64>>> {
        if let Some((mapping, computed_at)) =
            crate::db::percentiles::load_cache_entry(&self.db, score_field).await?
        {
            let age = Utc::now() - computed_at;
            if age <= self.ttl {
                tracing::debug!(score_field, population = mapping.len(), "Percentile cache hit");
                return Ok(Some(mapping));
            }
            tracing::debug!(
                score_field,
                age_seconds = age.num_seconds(),
                "Percentile cache entry expired"
            );
        }

        self.refresh(score_field).await
    }

    /// Recompute one field's percentiles from the score view and store
    /// them. Returns `None` when the view holds no values.
    pub async fn refresh(&self, score_field: &str) -> Result<Option<HashMap<String, f64>>> {
        let values = crate::db::evidence::load_score_view(&self.db, score_field).await?;

        if values.is_empty() {
            tracing::warn!(
                score_field,
                "No population values for percentile ranking; reporting unknown"
            );
            return Ok(None);
        }

        let mapping = compute_percentiles(&values);
        crate::db::percentiles::save_cache_entry(&self.db, score_field, &mapping, Utc::now())
            .await?;

        tracing::info!(
            score_field,
            population = mapping.len(),
            "Percentiles recomputed and cached"
        );

        Ok(Some(mapping))
    }

    /// One gene's percentile; `None` means not yet ranked.
    pub async fn get_percentile(&self, score_field: &str, hgnc_id: &str) -> Result<Option<f64>> {
        Ok(self
            .get_percentiles(score_field)
            .await?
            .and_then(|mapping| mapping.get(hgnc_id).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn test_empty_population_is_empty() {
        assert!(compute_percentiles(&[]).is_empty());
    }

    #[test]
    fn test_singleton_population_is_half() {
        let p = compute_percentiles(&values(&[("HGNC:1", 3.7)]));
        assert_eq!(p["HGNC:1"], 0.5);
    }

    #[test]
    fn test_ties_share_averaged_percentile() {
        let p = compute_percentiles(&values(&[
            ("HGNC:1", 1.0),
            ("HGNC:2", 2.0),
            ("HGNC:3", 2.0),
            ("HGNC:4", 5.0),
        ]));
        // Ranks 2 and 3 average to 2.5 → (2.5 - 0.5) / 4 = 0.5
        assert_eq!(p["HGNC:2"], p["HGNC:3"]);
        assert_eq!(p["HGNC:2"], 0.5);
        assert!(p["HGNC:1"] < p["HGNC:2"]);
        assert!(p["HGNC:4"] > p["HGNC:2"]);
    }

    #[test]
    fn test_maximum_never_reaches_one() {
        let p = compute_percentiles(&values(&[
            ("HGNC:1", 1.0),
            ("HGNC:2", 2.0),
            ("HGNC:3", 3.0),
        ]));
        assert!(p["HGNC:3"] < 1.0);
        assert!(p["HGNC:1"] > 0.0);
    }

    #[test]
    fn test_all_tied_population_is_half() {
        let p = compute_percentiles(&values(&[
            ("HGNC:1", 2.0),
            ("HGNC:2", 2.0),
            ("HGNC:3", 2.0),
        ]));
        for v in p.values() {
            assert_eq!(*v, 0.5);
        }
    }
}
