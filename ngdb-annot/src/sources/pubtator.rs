//! PubTator literature-mining client
//!
//! Counts publications co-mentioning each gene with kidney disease terms.
//! Publication counts are rank-based evidence: log-transformed so the jump
//! from 1 to 10 papers ranks like the jump from 100 to 1000.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;

const PUBTATOR_BASE_URL: &str = "https://www.ncbi.nlm.nih.gov/research/pubtator3-api";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    pmid: u64,
}

pub struct PubTatorClient {
    transport: ProviderTransport,
    base_url: String,
    gene_concurrency: usize,
}

impl PubTatorClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("pubtator", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| PUBTATOR_BASE_URL.to_string()),
            gene_concurrency: config.gene_concurrency,
        })
    }

    async fn publication_count(&self, symbol: &str) -> Result<(u64, Vec<u64>), SourceError> {
        let url = format!(
            "{}/search/?text=%40GENE_{}%20AND%20%22kidney%20disease%22",
            self.base_url, symbol
        );
        let response: SearchResponse = self.transport.get_json(&url).await?;
        let pmids = response.results.iter().map(|hit| hit.pmid).collect();
        Ok((response.count, pmids))
    }
}

#[async_trait]
impl SourceClient for PubTatorClient {
    fn source_id(&self) -> &'static str {
        "pubtator"
    }

    fn rank_field(&self) -> Option<&'static str> {
        Some("kidney_publications")
    }

    async fn fetch_raw_data(&self, ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let genes = crate::db::genes::list_symbols(&ctx.db, ctx.scope.as_deref()).await?;

        let results: Vec<(String, String, Result<(u64, Vec<u64>), SourceError>)> =
            stream::iter(genes)
                .map(|(hgnc_id, symbol)| async move {
                    let result = self.publication_count(&symbol).await;
                    (hgnc_id, symbol, result)
                })
                .buffer_unordered(self.gene_concurrency)
                .collect()
                .await;

        let mut outcome = FetchOutcome::default();
        for (hgnc_id, symbol, result) in results {
            match result {
                Ok((0, _)) => {}
                Ok((count, pmids)) => outcome.annotations.push(GeneAnnotation {
                    hgnc_id: Some(hgnc_id),
                    symbol: symbol.clone(),
                    raw_payload: json!({
                        "gene_symbol": symbol,
                        "publication_count": count,
                        "sample_pmids": pmids,
                    }),
                    signal: EvidenceSignal::Count {
                        field: "kidney_publications",
                        value: count,
                    },
                }),
                Err(SourceError::CircuitOpen(msg)) => {
                    return Err(SourceError::CircuitOpen(msg));
                }
                Err(err) => outcome.failures.push(GeneFailure {
                    identifier: symbol,
                    reason: err.to_string(),
                }),
            }
        }

        Ok(outcome)
    }
}
