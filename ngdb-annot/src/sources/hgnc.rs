//! HGNC identity client (foundational source)
//!
//! Fetches approved gene records and refreshes the canonical `genes` table.
//! Every downstream source resolves reported symbols against this identity,
//! so the orchestrator runs this client first as a hard barrier.

use super::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, ProviderTransport,
    SourceClient, SourceError,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const HGNC_BASE_URL: &str = "https://rest.genenames.org";

/// Paged response from the HGNC fetch endpoint
#[derive(Debug, Deserialize)]
struct HgncResponse {
    response: HgncDocs,
}

#[derive(Debug, Deserialize)]
struct HgncDocs {
    #[serde(rename = "numFound")]
    num_found: u64,
    docs: Vec<HgncDoc>,
}

#[derive(Debug, Deserialize)]
struct HgncDoc {
    hgnc_id: Option<String>,
    symbol: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    alias_symbol: Vec<String>,
    #[serde(default)]
    status: String,
}

pub struct HgncClient {
    transport: ProviderTransport,
    base_url: String,
    page_size: u32,
}

impl HgncClient {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Ok(Self {
            transport: ProviderTransport::new("hgnc", config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| HGNC_BASE_URL.to_string()),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SourceClient for HgncClient {
    fn source_id(&self) -> &'static str {
        "hgnc"
    }

    fn is_foundational(&self) -> bool {
        true
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        let mut outcome = FetchOutcome::default();
        let mut start = 0u64;

        loop {
            let url = format!(
                "{}/fetch/status/Approved?start={}&rows={}",
                self.base_url, start, self.page_size
            );
            let page: HgncResponse = self.transport.get_json(&url).await?;
            let fetched = page.response.docs.len() as u64;

            for doc in page.response.docs {
                match parse_doc(doc) {
                    Ok(annotation) => outcome.annotations.push(annotation),
                    Err(failure) => outcome.failures.push(failure),
                }
            }

            start += fetched;
            if fetched == 0 || start >= page.response.num_found {
                break;
            }
        }

        tracing::info!(
            genes = outcome.annotations.len(),
            failures = outcome.failures.len(),
            "HGNC identity fetch complete"
        );

        Ok(outcome)
    }

    /// Identity rows are never deleted wholesale: downstream evidence keys
    /// on them. Full mode refreshes display fields in place instead.
    async fn clear_existing_entries(&self, _db: &sqlx::SqlitePool) -> Result<u64, SourceError> {
        Ok(0)
    }
}

fn parse_doc(doc: HgncDoc) -> Result<GeneAnnotation, GeneFailure> {
    let symbol = doc.symbol.clone().filter(|s| !s.is_empty()).ok_or_else(|| GeneFailure {
        identifier: doc.hgnc_id.clone().unwrap_or_else(|| "<missing>".to_string()),
        reason: "HGNC record without approved symbol".to_string(),
    })?;

    let hgnc_id = doc.hgnc_id.clone().filter(|s| !s.is_empty()).ok_or_else(|| GeneFailure {
        identifier: symbol.clone(),
        reason: "HGNC record without stable id".to_string(),
    })?;

    Ok(GeneAnnotation {
        hgnc_id: Some(hgnc_id.clone()),
        symbol: symbol.clone(),
        raw_payload: json!({
            "hgnc_id": hgnc_id,
            "symbol": symbol,
            "name": doc.name,
            "alias_symbol": doc.alias_symbol,
            "status": doc.status,
        }),
        signal: EvidenceSignal::Identity {
            name: doc.name,
            aliases: doc.alias_symbol,
        },
    })
}
