//! PanelApp clients (Genomics England and PanelApp Australia)
//!
//! Both instances speak the same API and confidence vocabulary, so one
//! client covers both; the registry instantiates it twice with different
//! base URLs and kidney panel sets.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const PANELAPP_ENGLAND_URL: &str = "https://panelapp.genomicsengland.co.uk";
const PANELAPP_AUSTRALIA_URL: &str = "https://panelapp.agha.umccr.org";

/// Renal/kidney panel ids per instance
const ENGLAND_KIDNEY_PANELS: &[u32] = &[256, 275, 282];
const AUSTRALIA_KIDNEY_PANELS: &[u32] = &[217, 224];

#[derive(Debug, Deserialize)]
struct PanelGenesPage {
    next: Option<String>,
    results: Vec<PanelGene>,
}

#[derive(Debug, Deserialize)]
struct PanelGene {
    gene_data: Option<GeneData>,
    /// "3" = green, "2" = amber, "1" = red
    confidence_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeneData {
    hgnc_id: Option<String>,
    gene_symbol: Option<String>,
}

pub struct PanelAppClient {
    source_id: &'static str,
    transport: ProviderTransport,
    base_url: String,
    panels: &'static [u32],
}

impl PanelAppClient {
    pub fn england(config: &SourceConfig) -> Result<Self, SourceError> {
        Self::new_instance(
            "panelapp",
            PANELAPP_ENGLAND_URL,
            ENGLAND_KIDNEY_PANELS,
            config,
        )
    }

    pub fn australia(config: &SourceConfig) -> Result<Self, SourceError> {
        Self::new_instance(
            "panelapp_aus",
            PANELAPP_AUSTRALIA_URL,
            AUSTRALIA_KIDNEY_PANELS,
            config,
        )
    }

    fn new_instance(
        source_id: &'static str,
        default_url: &str,
        panels: &'static [u32],
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            source_id,
            transport: ProviderTransport::new(source_id, config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            panels,
        })
    }
}

#[async_trait]
impl SourceClient for PanelAppClient {
    fn source_id(&self) -> &'static str {
        self.source_id
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        // A gene may appear on several kidney panels; collect all its
        // confidence labels and let the normalizer take the maximum.
        let mut labels_by_gene: HashMap<String, (Option<String>, Vec<String>, Vec<u32>)> =
            HashMap::new();
        let mut failures = Vec::new();

        for panel_id in self.panels {
            let mut url = format!("{}/api/v1/panels/{}/genes/?format=json", self.base_url, panel_id);

            loop {
                let page: PanelGenesPage = self.transport.get_json(&url).await?;

                for entry in page.results {
                    match parse_entry(entry) {
                        Ok((hgnc_id, symbol, label)) => {
                            let slot = labels_by_gene.entry(symbol).or_insert_with(|| {
                                (hgnc_id.clone(), Vec::new(), Vec::new())
                            });
                            if slot.0.is_none() {
                                slot.0 = hgnc_id;
                            }
                            slot.1.push(label);
                            slot.2.push(*panel_id);
                        }
                        Err(failure) => failures.push(failure),
                    }
                }

                match page.next {
                    Some(next) => url = next,
                    None => break,
                }
            }
        }

        let annotations = labels_by_gene
            .into_iter()
            .map(|(symbol, (hgnc_id, labels, panels))| GeneAnnotation {
                hgnc_id,
                symbol: symbol.clone(),
                raw_payload: json!({
                    "gene_symbol": symbol,
                    "confidence_levels": labels,
                    "panels": panels,
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

fn parse_entry(entry: PanelGene) -> Result<(Option<String>, String, String), GeneFailure> {
    let gene_data = entry.gene_data.ok_or_else(|| GeneFailure {
        identifier: "<missing>".to_string(),
        reason: "Panel entry without gene_data".to_string(),
    })?;

    let symbol = gene_data
        .gene_symbol
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GeneFailure {
            identifier: gene_data.hgnc_id.clone().unwrap_or_else(|| "<missing>".to_string()),
            reason: "Panel entry without gene symbol".to_string(),
        })?;

    let label = match entry.confidence_level.as_deref() {
        Some("3") => "green",
        Some("2") => "amber",
        Some("1") => "red",
        other => {
            return Err(GeneFailure {
                identifier: symbol,
                reason: format!("Unknown confidence level: {other:?}"),
            });
        }
    };

    Ok((gene_data.hgnc_id, symbol, label.to_string()))
}
