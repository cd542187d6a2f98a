//! HPO phenotype-ontology client
//!
//! Fetches genes annotated under the kidney abnormality branch
//! (HP:0000077) and counts each gene's kidney phenotype terms.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const HPO_BASE_URL: &str = "https://ontology.jax.org";

/// Root of the kidney phenotype branch
const KIDNEY_ABNORMALITY_TERM: &str = "HP:0000077";

#[derive(Debug, Deserialize)]
struct TermGenesPage {
    #[serde(default)]
    genes: Vec<TermGene>,
    #[serde(rename = "totalCount", default)]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct TermGene {
    name: Option<String>,
    #[serde(rename = "phenotypeCount", default)]
    phenotype_count: u64,
    #[serde(rename = "diseaseCount", default)]
    disease_count: u64,
}

pub struct HpoClient {
    transport: ProviderTransport,
    base_url: String,
    page_size: u32,
}

impl HpoClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("hpo", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| HPO_BASE_URL.to_string()),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for HpoClient {
    fn source_id(&self) -> &'static str {
        "hpo"
    }

    fn rank_field(&self) -> Option<&'static str> {
        Some("kidney_phenotypes")
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let mut outcome = FetchOutcome::default();
        let mut offset = 0u64;

        loop {
            let url = format!(
                "{}/api/hp/terms/{}/genes?offset={}&limit={}",
                self.base_url, KIDNEY_ABNORMALITY_TERM, offset, self.page_size
            );
            let page: TermGenesPage = self.transport.get_json(&url).await?;
            let fetched = page.genes.len() as u64;

            for gene in page.genes {
                match gene.name.clone().filter(|s| !s.is_empty()) {
                    Some(symbol) if gene.phenotype_count > 0 => {
                        outcome.annotations.push(GeneAnnotation {
                            hgnc_id: None,
                            symbol: symbol.clone(),
                            raw_payload: json!({
                                "gene_symbol": symbol,
                                "phenotype_count": gene.phenotype_count,
                                "disease_count": gene.disease_count,
                                "branch": KIDNEY_ABNORMALITY_TERM,
                            }),
                            signal: EvidenceSignal::Count {
                                field: "kidney_phenotypes",
                                value: gene.phenotype_count,
                            },
                        });
                    }
                    Some(_) => {} // annotated but zero kidney terms
                    None => outcome.failures.push(GeneFailure {
                        identifier: "<missing>".to_string(),
                        reason: "HPO gene annotation without symbol".to_string(),
                    }),
                }
            }

            offset += fetched;
            if fetched == 0 || offset >= page.total_count {
                break;
            }
        }

        Ok(outcome)
    }
}
