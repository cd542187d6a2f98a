//! Classification normalizer
//!
//! Maps each source's native vocabulary into a [0,1] evidence weight using
//! the externally configured label table. The same semantic label carries
//! the same weight regardless of source. When one gene has several labels
//! the maximum wins: best available evidence, never an average or RMS
//! blend of ordinal categories.

use crate::config::ScoringConfig;
use crate::sources::EvidenceSignal;
use std::collections::HashMap;

/// Per-record normalization result
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvidence {
    /// Weight in [0,1]. Rank-based signals hold 0.0 here until the global
    /// recompute resolves their percentile.
    pub weight: f64,
    /// Value to feed into the population score view for percentile
    /// ranking, already log-transformed for counts
    pub rank: Option<(&'static str, f64)>,
}

pub struct ClassificationNormalizer {
    weights: HashMap<String, f64>,
}

impl ClassificationNormalizer {
    /// Build from validated configuration. `AnnotConfig::validate` has
    /// already rejected missing or out-of-range required labels.
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            weights: config.classification_weights.clone(),
        }
    }

    /// Maximum weight over a record's labels.
    ///
    /// A label the table does not know contributes 0.0 — absence of
    /// evidence, never a nonzero placeholder.
    pub fn weight_for_labels(&self, source: &str, labels: &[String]) -> f64 {
        let mut best: f64 = 0.0;
        for label in labels {
            match self.weights.get(label.as_str()) {
                Some(weight) => best = best.max(*weight),
                None => {
                    tracing::warn!(
                        source,
                        label = label.as_str(),
                        "Unrecognized classification label, counting as zero evidence"
                    );
                }
            }
        }
        best.clamp(0.0, 1.0)
    }

    /// ln(1 + count): equal ratios become equal deltas, so 1→10 ranks the
    /// same distance apart as 100→1000
    pub fn log_count(count: u64) -> f64 {
        (1.0 + count as f64).ln()
    }

    pub fn normalize(&self, source: &str, signal: &EvidenceSignal) -> NormalizedEvidence {
        match signal {
            // Identity signals create gene rows, not evidence
            EvidenceSignal::Identity { .. } => NormalizedEvidence {
                weight: 0.0,
                rank: None,
            },
            EvidenceSignal::Classifications(labels) => NormalizedEvidence {
                weight: self.weight_for_labels(source, labels),
                rank: None,
            },
            EvidenceSignal::Count { field, value } => NormalizedEvidence {
                weight: 0.0,
                rank: Some((field, Self::log_count(*value))),
            },
            EvidenceSignal::Continuous { field, value } => NormalizedEvidence {
                weight: 0.0,
                rank: Some((field, *value)),
            },
        }
    }
}
