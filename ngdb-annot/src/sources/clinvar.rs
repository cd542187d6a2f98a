//! ClinVar pathogenic-variant client
//!
//! Counts pathogenic / likely-pathogenic kidney variants per gene. Two
//! independent knobs drive the fetch: `page_size` is how many variants one
//! provider page returns, `gene_concurrency` is how many genes are queried
//! at once. They are never derived from one another; multiplying them
//! together is exactly the request-storm failure this layout prevents.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::json;

const CLINVAR_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    /// Total hits for the query, as a decimal string
    count: String,
    #[serde(default)]
    idlist: Vec<String>,
}

pub struct ClinVarClient {
    transport: ProviderTransport,
    base_url: String,
    page_size: u32,
    gene_concurrency: usize,
}

impl ClinVarClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("clinvar", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| CLINVAR_BASE_URL.to_string()),
            page_size: config.page_size,
            gene_concurrency: config.gene_concurrency,
        })
    }

    /// Count P/LP variants for one gene, paging through its variant list.
    /// The rate gate inside the transport spaces the page requests out.
    async fn count_variants(&self, symbol: &str) -> Result<(u64, Vec<String>), SourceError> {
        let mut variant_ids = Vec::new();
        let mut retstart = 0u64;

        loop {
            let url = format!(
                "{}/esearch.fcgi?db=clinvar&term={}%5Bgene%5D+AND+%28clinsig_pathogenic%5BProperties%5D+OR+clinsig_likely_pathogenic%5BProperties%5D%29&retstart={}&retmax={}&retmode=json",
                self.base_url, symbol, retstart, self.page_size
            );
            let page: EsearchResponse = self.transport.get_json(&url).await?;

            let total: u64 = page
                .esearchresult
                .count
                .parse()
                .map_err(|_| SourceError::Parse(format!(
                    "Non-numeric count for {symbol}: {}",
                    page.esearchresult.count
                )))?;

            let fetched = page.esearchresult.idlist.len() as u64;
            variant_ids.extend(page.esearchresult.idlist);

            retstart += fetched;
            if fetched == 0 || retstart >= total {
                return Ok((total, variant_ids));
            }
        }
    }
}

#[async_trait]
impl SourceClient for ClinVarClient {
    fn source_id(&self) -> &'static str {
        "clinvar"
    }

    fn rank_field(&self) -> Option<&'static str> {
        Some("clinvar_plp_variants")
    }

    async fn fetch_raw_data(&self, ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let genes =
            crate::db::genes::list_symbols(&ctx.db, ctx.scope.as_deref()).await?;

        // Per-gene results under bounded concurrency; one gene's failure
        // is isolated into the outcome instead of aborting the stream.
        let results: Vec<(String, String, Result<(u64, Vec<String>), SourceError>)> =
            stream::iter(genes)
                .map(|(hgnc_id, symbol)| async move {
                    let result = self.count_variants(&symbol).await;
                    (hgnc_id, symbol, result)
                })
                .buffer_unordered(self.gene_concurrency)
                .collect()
                .await;

        let mut outcome = FetchOutcome::default();
        for (hgnc_id, symbol, result) in results {
            match result {
                Ok((0, _)) => {} // no P/LP variants, no evidence row
                Ok((count, variant_ids)) => outcome.annotations.push(GeneAnnotation {
                    hgnc_id: Some(hgnc_id),
                    symbol: symbol.clone(),
                    raw_payload: json!({
                        "gene_symbol": symbol,
                        "plp_variant_count": count,
                        "variant_ids": variant_ids,
                    }),
                    signal: EvidenceSignal::Count {
                        field: "clinvar_plp_variants",
                        value: count,
                    },
                }),
                // Provider down for everyone: fail the source, not the gene
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
