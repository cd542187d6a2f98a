//! Whole-population aggregate recompute
//!
//! Runs once at the end of every pipeline run (and on demand). Resolves
//! rank-based evidence weights from their percentiles, then rebuilds the
//! aggregate_scores table from a single summation pass over
//! evidence_records. Rerunning against unchanged evidence produces
//! identical aggregates.

use super::PercentileService;
use crate::models::AggregateScore;
use chrono::Utc;
use ngdb_common::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Recompute all aggregate scores.
///
/// `rank_sources` maps each rank-based source to its score field; their
/// evidence weights are the gene's percentile in that field's population.
/// A field with no population yet leaves its weights at 0.0 and its
/// percentile keys absent, so a missing rank reads as "not yet ranked"
/// rather than a fabricated score.
///
/// Returns the number of genes scored.
pub async fn recompute_aggregates(
    pool: &SqlitePool,
    percentile_service: &PercentileService,
    rank_sources: &[(String, &'static str)],
    active_source_count: usize,
) -> Result<usize> {
    // Percentile mapping per score field, refreshed from the current
    // population rather than the cache
    let mut field_percentiles: HashMap<&'static str, HashMap<String, f64>> = HashMap::new();

    for (source_id, score_field) in rank_sources {
        match percentile_service.refresh(score_field).await? {
            Some(mapping) => {
                for (hgnc_id, percentile) in &mapping {
                    crate::db::evidence::set_normalized_weight(
                        pool, hgnc_id, source_id, *percentile,
                    )
                    .await?;
                }
                field_percentiles.insert(score_field, mapping);
            }
            None => {
                tracing::warn!(
                    source = %source_id,
                    score_field,
                    "No ranked population for source; its evidence stays unweighted"
                );
            }
        }
    }

    let sums = crate::db::evidence::sum_weights_by_gene(pool).await?;
    let divisor = active_source_count.max(1) as f64;
    let computed_at = Utc::now();

    let scores: Vec<AggregateScore> = sums
        .into_iter()
        .map(|(hgnc_id, raw_score, source_count)| {
            let percentiles: HashMap<String, f64> = field_percentiles
                .iter()
                .filter_map(|(field, mapping)| {
                    mapping.get(&hgnc_id).map(|p| (field.to_string(), *p))
                })
                .collect();

            AggregateScore {
                percentage_score: raw_score / divisor * 100.0,
                hgnc_id,
                raw_score,
                source_count,
                percentiles,
                computed_at,
            }
        })
        .collect();

    crate::db::scores::replace_aggregate_scores(pool, &scores).await?;

    tracing::info!(
        genes = scores.len(),
        rank_fields = field_percentiles.len(),
        "Aggregate scores recomputed"
    );

    Ok(scores.len())
}
