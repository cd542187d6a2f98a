//! Source clients for external biomedical data providers
//!
//! All ~10 providers share one framework: the `SourceClient` trait plus a
//! `ProviderTransport` that composes the resilience layer (retry executor,
//! circuit breaker, per-source rate gate) around reqwest. Each client file
//! keeps its provider's response DTOs next to the fetch logic.

pub mod clingen;
pub mod clinvar;
pub mod gencc;
pub mod hgnc;
pub mod hpo;
pub mod omim;
pub mod panelapp;
pub mod pubtator;
pub mod stringdb;

use crate::config::{AnnotConfig, SourceConfig};
use crate::models::UpdateMode;
use crate::resilience::{CircuitBreaker, RateGate, RetryPolicy, Retryable};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// All source ids the pipeline knows, foundational source first
pub const KNOWN_SOURCES: &[&str] = &[
    "hgnc",
    "panelapp",
    "panelapp_aus",
    "clingen",
    "gencc",
    "omim",
    "clinvar",
    "pubtator",
    "hpo",
    "stringdb",
];

/// The identity-normalization source every other source depends on
pub const FOUNDATIONAL_SOURCE: &str = "hgnc";

const USER_AGENT: &str = "ngdb-annot/0.1.0 (https://github.com/ngdb/ngdb)";

/// Source client errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Rate limit response from provider")]
    RateLimited,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Network(_) | SourceError::RateLimited => true,
            SourceError::Api(status, _) => *status >= 500,
            SourceError::Parse(_) | SourceError::CircuitOpen(_) | SourceError::Database(_) => false,
        }
    }
}

impl From<ngdb_common::Error> for SourceError {
    fn from(err: ngdb_common::Error) -> Self {
        SourceError::Database(err.to_string())
    }
}

/// The evidence a source reports for one gene, before normalization
#[derive(Debug, Clone)]
pub enum EvidenceSignal {
    /// Canonical identity from the foundational source; creates/refreshes
    /// the gene row instead of an evidence row
    Identity { name: String, aliases: Vec<String> },
    /// Ordinal classification labels; the best one wins
    Classifications(Vec<String>),
    /// Raw occurrence count; log-transformed before percentile ranking
    Count { field: &'static str, value: u64 },
    /// Continuous score, ranked as-is
    Continuous { field: &'static str, value: f64 },
}

/// One gene's raw annotation from one provider fetch
#[derive(Debug, Clone)]
pub struct GeneAnnotation {
    /// Stable identifier when the provider reports one
    pub hgnc_id: Option<String>,
    /// Reported symbol, used for identity resolution when hgnc_id is absent
    pub symbol: String,
    /// Provider payload kept verbatim for audit
    pub raw_payload: serde_json::Value,
    pub signal: EvidenceSignal,
}

/// A gene the provider reported but the client could not parse
#[derive(Debug, Clone)]
pub struct GeneFailure {
    pub identifier: String,
    pub reason: String,
}

/// Result of one source's fetch: parsed annotations plus isolated per-gene
/// failures. A malformed entity never aborts its siblings.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub annotations: Vec<GeneAnnotation>,
    pub failures: Vec<GeneFailure>,
}

/// Context threaded through every source fetch
pub struct FetchContext {
    pub db: SqlitePool,
    pub mode: UpdateMode,
    /// None = full population; Some = explicit gene-id subset
    pub scope: Option<Vec<String>>,
}

/// Uniform interface implemented by every source client
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// The foundational identity source runs first and blocks all others
    fn is_foundational(&self) -> bool {
        false
    }

    /// Score field this source feeds into percentile ranking, if any
    fn rank_field(&self) -> Option<&'static str> {
        None
    }

    /// Fetch this source's annotations for the context's gene scope
    async fn fetch_raw_data(&self, ctx: &FetchContext) -> Result<FetchOutcome, SourceError>;

    /// Delete this source's existing evidence (mandatory for full mode).
    ///
    /// Every source implements deletion through the same default so full
    /// runs actually remove genes a past filtering rule let in.
    async fn clear_existing_entries(&self, db: &SqlitePool) -> Result<u64, SourceError> {
        Ok(crate::db::evidence::delete_source_evidence(db, self.source_id()).await?)
    }
}

/// HTTP transport composing the shared resilience layer.
///
/// Owned per client: its rate gate and breaker are this provider's alone.
pub struct ProviderTransport {
    source_id: &'static str,
    http: reqwest::Client,
    gate: RateGate,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ProviderTransport {
    pub fn new(source_id: &'static str, config: &SourceConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            source_id,
            http,
            gate: RateGate::per_second(config.requests_per_second),
            retry: RetryPolicy::new(&config.retry),
            breaker: CircuitBreaker::new(source_id, &config.breaker),
        })
    }

    /// GET a JSON document under this source's rate/retry/breaker policy.
    ///
    /// Each provider call is retried with backoff internally; the call as a
    /// whole counts once against the circuit breaker.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.breaker
            .try_acquire()
            .map_err(|e| SourceError::CircuitOpen(e.to_string()))?;

        let result = self
            .retry
            .execute(self.source_id, || self.get_json_once(url))
            .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }

        result
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.gate.acquire().await;

        tracing::debug!(source = self.source_id, url = %url, "Querying provider");

        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 || status.as_u16() == 503 {
            return Err(SourceError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

/// Build all enabled source clients from configuration
pub fn build_registry(config: &AnnotConfig) -> Result<Vec<Arc<dyn SourceClient>>, SourceError> {
    let mut registry: Vec<Arc<dyn SourceClient>> = Vec::new();

    for id in KNOWN_SOURCES {
        let source_config = config.source(id);
        if !source_config.enabled {
            tracing::info!(source = id, "Source disabled by configuration");
            continue;
        }

        let client: Arc<dyn SourceClient> = match *id {
            "hgnc" => Arc::new(hgnc::HgncClient::new(&source_config)?),
            "panelapp" => Arc::new(panelapp::PanelAppClient::england(&source_config)?),
            "panelapp_aus" => Arc::new(panelapp::PanelAppClient::australia(&source_config)?),
            "clingen" => Arc::new(clingen::ClinGenClient::new(&source_config)?),
            "gencc" => Arc::new(gencc::GenCcClient::new(&source_config)?),
            "omim" => Arc::new(omim::OmimClient::new(&source_config)?),
            "clinvar" => Arc::new(clinvar::ClinVarClient::new(&source_config)?),
            "pubtator" => Arc::new(pubtator::PubTatorClient::new(&source_config)?),
            "hpo" => Arc::new(hpo::HpoClient::new(&source_config)?),
            "stringdb" => Arc::new(stringdb::StringDbClient::new(&source_config)?),
            other => {
                tracing::warn!(source = other, "Unknown source id in registry, skipping");
                continue;
            }
        };
        registry.push(client);
    }

    Ok(registry)
}
