//! Annotation service configuration
//!
//! All knobs the pipeline consumes are externally supplied here: per-source
//! rate limits, retry/backoff parameters, circuit-breaker thresholds, the
//! classification label→weight table, display thresholds, and the percentile
//! cache TTL. The file is validated at startup; a missing label mapping is a
//! fatal configuration error, never a silently-defaulted weight.

use ngdb_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Classification labels every deployment must map to a weight.
///
/// The same semantic label carries the same weight regardless of which
/// source reported it, so the table is global rather than per-source.
const REQUIRED_LABELS: &[&str] = &[
    "definitive",
    "strong",
    "moderate",
    "limited",
    "disputed",
    "refuted",
    "no_known_disease_relationship",
    "animal",
    "green",
    "amber",
    "red",
];

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    /// Per-source settings, keyed by source id ("panelapp", "clinvar", ...)
    pub sources: HashMap<String, SourceConfig>,
    pub scoring: ScoringConfig,
    pub percentile: PercentileConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5850,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How many non-foundational sources run at once (a bounded pool,
    /// never unbounded fan-out)
    pub source_concurrency: usize,
    /// Emit a progress event every N processed genes
    pub progress_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_concurrency: 3,
            progress_interval: 25,
        }
    }
}

/// Per-source fetch and resilience settings
///
/// `page_size` (sub-items requested per network call) and
/// `gene_concurrency` (top-level genes processed at once) are deliberately
/// separate fields. Reusing one value for both multiplies into request
/// storms against providers with single-digit req/s ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    /// Override the client's built-in base URL (used by tests)
    pub base_url: Option<String>,
    /// Requests-per-second ceiling for this provider alone
    pub requests_per_second: u32,
    pub timeout_seconds: u64,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    /// Sub-items (variants, publications) per provider page
    pub page_size: u32,
    /// Genes in flight at once within this source's update
    pub gene_concurrency: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            requests_per_second: 3,
            timeout_seconds: 30,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            page_size: 100,
            gene_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe
    pub cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Global classification label → weight table, lowercase keys
    pub classification_weights: HashMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        // ClinGen / GenCC clinical-validity vocabulary
        weights.insert("definitive".to_string(), 1.0);
        weights.insert("strong".to_string(), 0.75);
        weights.insert("moderate".to_string(), 0.5);
        weights.insert("limited".to_string(), 0.25);
        weights.insert("disputed".to_string(), 0.0);
        weights.insert("refuted".to_string(), 0.0);
        weights.insert("no_known_disease_relationship".to_string(), 0.0);
        weights.insert("animal".to_string(), 0.25);
        // PanelApp confidence vocabulary
        weights.insert("green".to_string(), 1.0);
        weights.insert("amber".to_string(), 0.5);
        weights.insert("red".to_string(), 0.0);
        Self {
            classification_weights: weights,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PercentileConfig {
    /// Cache entries older than this are recomputed, never served
    pub cache_ttl_seconds: i64,
}

impl Default for PercentileConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 24 * 3600,
        }
    }
}

/// Display-side filtering thresholds.
///
/// These never affect ingestion: raw evidence is always persisted, and the
/// thresholds are applied only by read queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Hide (but retain) genes below this percentage score when listing
    pub min_percentage_score: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            min_percentage_score: 0.0,
        }
    }
}

impl Default for AnnotConfig {
    fn default() -> Self {
        let mut sources: HashMap<String, SourceConfig> = HashMap::new();
        for id in crate::sources::KNOWN_SOURCES {
            sources.insert(id.to_string(), SourceConfig::default());
        }
        // Provider-specific rate ceilings (documented API policies)
        if let Some(s) = sources.get_mut("clinvar") {
            s.requests_per_second = 2;
            s.page_size = 250;
            s.gene_concurrency = 2;
        }
        if let Some(s) = sources.get_mut("pubtator") {
            s.requests_per_second = 3;
        }
        if let Some(s) = sources.get_mut("stringdb") {
            s.requests_per_second = 10;
        }
        if let Some(s) = sources.get_mut("hgnc") {
            s.requests_per_second = 10;
            s.page_size = 500;
        }

        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            sources,
            scoring: ScoringConfig::default(),
            percentile: PercentileConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl AnnotConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let config: AnnotConfig = ngdb_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Called at startup (and again before a hot reload is accepted) so that
    /// taxonomy gaps surface immediately instead of becoming silent zero
    /// weights mid-pipeline.
    pub fn validate(&self) -> Result<()> {
        for label in REQUIRED_LABELS {
            match self.scoring.classification_weights.get(*label) {
                None => {
                    return Err(Error::Config(format!(
                        "Missing classification weight for label '{label}'"
                    )));
                }
                Some(w) if !(0.0..=1.0).contains(w) => {
                    return Err(Error::Config(format!(
                        "Classification weight for '{label}' out of range [0,1]: {w}"
                    )));
                }
                Some(_) => {}
            }
        }

        for (id, source) in &self.sources {
            if source.requests_per_second == 0 {
                return Err(Error::Config(format!(
                    "Source '{id}': requests_per_second must be at least 1"
                )));
            }
            if source.retry.max_attempts == 0 {
                return Err(Error::Config(format!(
                    "Source '{id}': retry.max_attempts must be at least 1"
                )));
            }
            if source.page_size == 0 || source.gene_concurrency == 0 {
                return Err(Error::Config(format!(
                    "Source '{id}': page_size and gene_concurrency must be nonzero"
                )));
            }
        }

        if self.pipeline.source_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.source_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings for one source, falling back to defaults for sources the
    /// file does not mention.
    pub fn source(&self, source_id: &str) -> SourceConfig {
        self.sources.get(source_id).cloned().unwrap_or_default()
    }

    /// Enabled source ids, foundational source included.
    pub fn enabled_sources(&self) -> Vec<String> {
        crate::sources::KNOWN_SOURCES
            .iter()
            .filter(|id| self.source(id).enabled)
            .map(|id| id.to_string())
            .collect()
    }

    /// Number of enabled evidence-bearing sources (the foundational
    /// identity source contributes no evidence and is excluded).
    pub fn active_source_count(&self) -> usize {
        self.enabled_sources()
            .iter()
            .filter(|id| id.as_str() != crate::sources::FOUNDATIONAL_SOURCE)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnnotConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_label_is_fatal() {
        let mut config = AnnotConfig::default();
        config.scoring.classification_weights.remove("amber");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("amber"));
    }

    #[test]
    fn test_out_of_range_weight_is_fatal() {
        let mut config = AnnotConfig::default();
        config
            .scoring
            .classification_weights
            .insert("green".to_string(), 1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_is_fatal() {
        let mut config = AnnotConfig::default();
        config.sources.get_mut("clinvar").unwrap().requests_per_second = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_source_count_excludes_foundational() {
        let config = AnnotConfig::default();
        // 10 known sources, one of which is the identity source
        assert_eq!(config.active_source_count(), 9);
    }

    #[test]
    fn test_batch_size_and_concurrency_are_independent() {
        let config = AnnotConfig::default();
        let clinvar = config.source("clinvar");
        // Page size tuned for variant pagination must not leak into the
        // gene-level concurrency factor.
        assert_eq!(clinvar.page_size, 250);
        assert_eq!(clinvar.gene_concurrency, 2);
    }
}
