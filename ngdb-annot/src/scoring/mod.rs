//! Classification normalization, evidence aggregation, and percentile
//! ranking

mod aggregator;
mod normalizer;
mod percentile;

pub use aggregator::recompute_aggregates;
pub use normalizer::{ClassificationNormalizer, NormalizedEvidence};
pub use percentile::{compute_percentiles, PercentileService};
