//! STRING protein-interaction client
//!
//! Derives a network-centrality score per gene from interactions within
//! the kidney gene population: the sum of combined interaction scores with
//! other population members. The score is continuous and only meaningful
//! relative to the population, so it is ranked by the percentile service
//! rather than mapped through a weight table.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, ProviderTransport, SourceClient,
    SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const STRING_BASE_URL: &str = "https://string-db.org";
const SPECIES_HUMAN: u32 = 9606;

/// One edge from the network endpoint
#[derive(Debug, Deserialize)]
struct Interaction {
    #[serde(rename = "preferredName_A")]
    preferred_name_a: String,
    #[serde(rename = "preferredName_B")]
    preferred_name_b: String,
    /// Combined confidence score, 0–1000
    score: f64,
}

pub struct StringDbClient {
    transport: ProviderTransport,
    base_url: String,
    /// Identifiers per network request (provider caps the URL length)
    page_size: u32,
}

impl StringDbClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("stringdb", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| STRING_BASE_URL.to_string()),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for StringDbClient {
    fn source_id(&self) -> &'static str {
        "stringdb"
    }

    fn rank_field(&self) -> Option<&'static str> {
        Some("interaction_score")
    }

    async fn fetch_raw_data(&self, ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let genes = crate::db::genes::list_symbols(&ctx.db, ctx.scope.as_deref()).await?;
        let id_by_symbol: HashMap<String, String> = genes
            .iter()
            .map(|(id, symbol)| (symbol.clone(), id.clone()))
            .collect();

        // Degree-weighted centrality: sum of combined scores over all
        // edges touching the gene, both endpoints inside the population.
        let mut centrality: HashMap<String, (f64, u64)> = HashMap::new();

        for chunk in genes.chunks(self.page_size as usize) {
            let identifiers = chunk
                .iter()
                .map(|(_, symbol)| symbol.as_str())
                .collect::<Vec<_>>()
                .join("%0d");
            let url = format!(
                "{}/api/json/network?identifiers={}&species={}",
                self.base_url, identifiers, SPECIES_HUMAN
            );

            let interactions: Vec<Interaction> = self.transport.get_json(&url).await?;

            for edge in interactions {
                for symbol in [&edge.preferred_name_a, &edge.preferred_name_b] {
                    if id_by_symbol.contains_key(symbol.as_str()) {
                        let slot = centrality.entry(symbol.clone()).or_insert((0.0, 0));
                        slot.0 += edge.score / 1000.0;
                        slot.1 += 1;
                    }
                }
            }
        }

        let annotations = centrality
            .into_iter()
            .map(|(symbol, (score, partner_count))| GeneAnnotation {
                hgnc_id: id_by_symbol.get(&symbol).cloned(),
                symbol: symbol.clone(),
                raw_payload: json!({
                    "gene_symbol": symbol,
                    "interaction_score": score,
                    "partner_count": partner_count,
                }),
                signal: EvidenceSignal::Continuous {
                    field: "interaction_score",
                    value: score,
                },
            })
            .collect();

        Ok(FetchOutcome {
            annotations,
            failures: Vec::new(),
        })
    }
}
