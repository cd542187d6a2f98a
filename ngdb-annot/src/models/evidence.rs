//! Evidence records and derived aggregate scores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One gene's raw annotation payload from one source.
///
/// At most one row exists per (gene, source) pair; the source's update
/// routine replaces it wholesale (full mode) or upserts it (incremental).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub hgnc_id: String,
    pub source_id: String,
    /// The source's raw structured payload, kept verbatim for audit
    pub raw_payload: serde_json::Value,
    /// Evidence weight in [0,1] derived by the classification normalizer.
    /// Rank-based sources hold 0.0 until the global recompute resolves
    /// their percentile.
    pub normalized_weight: f64,
    pub updated_at: DateTime<Utc>,
}

/// Derived per-gene score row. Never hand-edited; recomputed after every
/// pipeline run and idempotent under identical evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateScore {
    pub hgnc_id: String,
    /// Sum of normalized weights over all sources with evidence
    pub raw_score: f64,
    /// raw_score / active_source_count * 100
    pub percentage_score: f64,
    /// Sources holding evidence for this gene
    pub source_count: i64,
    /// Percentile per continuous score field; an absent key means
    /// "not yet ranked", never the maximum.
    pub percentiles: HashMap<String, f64>,
    pub computed_at: DateTime<Utc>,
}
