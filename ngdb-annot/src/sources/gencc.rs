//! GenCC submitted-classification client
//!
//! GenCC aggregates validity submissions from member organizations; one
//! gene commonly carries several submissions with different labels. All are
//! reported; the normalizer keeps the strongest.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const GENCC_BASE_URL: &str = "https://search.thegencc.org";

#[derive(Debug, Deserialize)]
struct SubmissionsPage {
    #[serde(default)]
    results: Vec<Submission>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Submission {
    /// e.g. "HGNC:9008"
    gene_curie: Option<String>,
    gene_symbol: Option<String>,
    classification_title: Option<String>,
    #[serde(default)]
    submitter_title: String,
    #[serde(default)]
    disease_title: String,
}

pub struct GenCcClient {
    transport: ProviderTransport,
    base_url: String,
    page_size: u32,
}

impl GenCcClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("gencc", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GENCC_BASE_URL.to_string()),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for GenCcClient {
    fn source_id(&self) -> &'static str {
        "gencc"
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let mut by_gene: HashMap<String, (Option<String>, Vec<String>, Vec<serde_json::Value>)> =
            HashMap::new();
        let mut failures = Vec::new();
        let mut offset = 0u64;

        loop {
            let url = format!(
                "{}/api/submissions?query=kidney&offset={}&limit={}",
                self.base_url, offset, self.page_size
            );
            let page: SubmissionsPage = self.transport.get_json(&url).await?;
            let fetched = page.results.len() as u64;

            for submission in page.results {
                match parse_submission(submission) {
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
            .map(|(symbol, (hgnc_id, labels, submissions))| GeneAnnotation {
                hgnc_id,
                symbol: symbol.clone(),
                raw_payload: json!({
                    "gene_symbol": symbol,
                    "classifications": labels,
                    "submissions": submissions,
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

fn parse_submission(
    submission: Submission,
) -> Result<(Option<String>, String, String, serde_json::Value), GeneFailure> {
    let symbol = submission
        .gene_symbol
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GeneFailure {
            identifier: submission
                .gene_curie
                .clone()
                .unwrap_or_else(|| "<missing>".to_string()),
            reason: "Submission without gene symbol".to_string(),
        })?;

    let label = submission
        .classification_title
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GeneFailure {
            identifier: symbol.clone(),
            reason: "Submission without classification".to_string(),
        })?;

    let normalized_label = label.to_lowercase().replace(' ', "_");

    let detail = json!({
        "classification": label,
        "submitter": submission.submitter_title,
        "disease": submission.disease_title,
    });

    Ok((submission.gene_curie, symbol, normalized_label, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animal_model_label_normalizes() {
        let submission = Submission {
            gene_curie: Some("HGNC:2204".to_string()),
            gene_symbol: Some("COL4A3".to_string()),
            classification_title: Some("Animal".to_string()),
            submitter_title: "TestOrg".to_string(),
            disease_title: "Alport syndrome".to_string(),
        };
        let (hgnc_id, symbol, label, _) = parse_submission(submission).unwrap();
        assert_eq!(hgnc_id.as_deref(), Some("HGNC:2204"));
        assert_eq!(symbol, "COL4A3");
        assert_eq!(label, "animal");
    }

    #[test]
    fn test_missing_symbol_is_gene_failure() {
        let submission = Submission {
            gene_curie: Some("HGNC:2204".to_string()),
            gene_symbol: None,
            classification_title: Some("Strong".to_string()),
            submitter_title: String::new(),
            disease_title: String::new(),
        };
        assert!(parse_submission(submission).is_err());
    }
}
