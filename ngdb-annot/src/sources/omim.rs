//! OMIM morbid-map client
//!
//! Counts kidney-phenotype entries per gene. Counts are rank-based
//! evidence: the per-gene entry count is log-transformed into the
//! population score view and weighted by percentile at recompute.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const OMIM_BASE_URL: &str = "https://api.omim.org";

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    entries: Vec<MorbidEntry>,
    #[serde(rename = "totalResults", default)]
    total_results: u64,
}

#[derive(Debug, Deserialize)]
struct MorbidEntry {
    gene_symbol: Option<String>,
    #[serde(default)]
    mim_number: u64,
    #[serde(default)]
    phenotype: String,
}

pub struct OmimClient {
    transport: ProviderTransport,
    base_url: String,
    page_size: u32,
}

impl OmimClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("omim", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OMIM_BASE_URL.to_string()),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for OmimClient {
    fn source_id(&self) -> &'static str {
        "omim"
    }

    fn rank_field(&self) -> Option<&'static str> {
        Some("omim_entries")
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let mut entries_by_gene: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
        let mut failures = Vec::new();
        let mut start = 0u64;

        loop {
            let url = format!(
                "{}/api/geneMap/search?phenotype=kidney&start={}&limit={}&format=json",
                self.base_url, start, self.page_size
            );
            let page: SearchPage = self.transport.get_json(&url).await?;
            let fetched = page.entries.len() as u64;

            for entry in page.entries {
                match entry.gene_symbol.clone().filter(|s| !s.is_empty()) {
                    Some(symbol) => {
                        entries_by_gene.entry(symbol).or_default().push(json!({
                            "mim_number": entry.mim_number,
                            "phenotype": entry.phenotype,
                        }));
                    }
                    None => failures.push(GeneFailure {
                        identifier: format!("MIM:{}", entry.mim_number),
                        reason: "Morbid-map entry without gene symbol".to_string(),
                    }),
                }
            }

            start += fetched;
            if fetched == 0 || start >= page.total_results {
                break;
            }
        }

        let annotations = entries_by_gene
            .into_iter()
            .map(|(symbol, entries)| {
                let count = entries.len() as u64;
                GeneAnnotation {
                    hgnc_id: None,
                    symbol: symbol.clone(),
                    raw_payload: json!({
                        "gene_symbol": symbol,
                        "entry_count": count,
                        "entries": entries,
                    }),
                    signal: EvidenceSignal::Count {
                        field: "omim_entries",
                        value: count,
                    },
                }
            })
            .collect();

        Ok(FetchOutcome {
            annotations,
            failures,
        })
    }
}
