//! ClinGen gene–disease validity client
//!
//! Fetches curated clinical-validity classifications for kidney phenotypes.
//! Several curations may exist per gene (one per disease entity); all their
//! labels are reported and the normalizer keeps the strongest.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const CLINGEN_BASE_URL: &str = "https://search.clinicalgenome.org";

#[derive(Debug, Deserialize)]
struct CurationsPage {
    #[serde(default)]
    rows: Vec<Curation>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Curation {
    gene: Option<CurationGene>,
    classification: Option<String>,
    #[serde(default)]
    disease_label: String,
    #[serde(default)]
    mondo_id: String,
}

#[derive(Debug, Deserialize)]
struct CurationGene {
    hgnc_id: Option<String>,
    symbol: Option<String>,
}

pub struct ClinGenClient {
    transport: ProviderTransport,
    base_url: String,
    page_size: u32,
}

impl ClinGenClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("clingen", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| CLINGEN_BASE_URL.to_string()),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for ClinGenClient {
    fn source_id(&self) -> &'static str {
        "clingen"
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let mut by_gene: HashMap<String, (Option<String>, Vec<String>, Vec<serde_json::Value>)> =
            HashMap::new();
        let mut failures = Vec::new();
        let mut offset = 0u64;

        loop {
            let url = format!(
                "{}/api/curations?queryString=kidney&offset={}&limit={}",
                self.base_url, offset, self.page_size
            );
            let page: CurationsPage = self.transport.get_json(&url).await?;
            let fetched = page.rows.len() as u64;

            for curation in page.rows {
                match parse_curation(curation) {
                    Ok((hgnc_id, symbol, label, detail)) => {
                        let slot = by_gene
                            .entry(symbol)
                            .or_insert_with(|| (hgnc_id.clone(), Vec::new(), Vec::new()));
                        if slot.0.is_none() {
                            slot.0 = hgnc_id;
                        }
                        slot.1.push(label);
                        slot.2.push(detail);
                    }
                    Err(failure) => failures.push(failure),
                }
            }

            offset += fetched;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }

        let annotations = by_gene
            .into_iter()
            .map(|(symbol, (hgnc_id, labels, curations))| GeneAnnotation {
                hgnc_id,
                symbol: symbol.clone(),
                raw_payload: json!({
                    "symbol": symbol,
                    "classifications": labels,
                    "curations": curations,
                }),
                signal: EvidenceSignal::Classifications(labels),
            })
            .collect();

        Ok(FetchOutcome {
            annotations,
            failures,
        })
    }
}

fn parse_curation(
    curation: Curation,
) -> Result<(Option<String>, String, String, serde_json::Value), GeneFailure> {
    let gene = curation.gene.ok_or_else(|| GeneFailure {
        identifier: "<missing>".to_string(),
        reason: "Curation without gene".to_string(),
    })?;

    let symbol = gene.symbol.filter(|s| !s.is_empty()).ok_or_else(|| GeneFailure {
        identifier: gene.hgnc_id.clone().unwrap_or_else(|| "<missing>".to_string()),
        reason: "Curation without gene symbol".to_string(),
    })?;

    let label = curation
        .classification
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GeneFailure {
            identifier: symbol.clone(),
            reason: "Curation without classification".to_string(),
        })?;

    // Lowercased with spaces collapsed so the label matches the global
    // weight table ("No Known Disease Relationship" and friends included)
    let normalized_label = label.to_lowercase().replace(' ', "_");

    let detail = json!({
        "classification": label,
        "disease_label": curation.disease_label,
        "mondo_id": curation.mondo_id,
    });

    Ok((gene.hgnc_id, symbol, normalized_label, detail))
}
