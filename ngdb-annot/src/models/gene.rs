//! Canonical gene identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One gene with canonical identity.
///
/// Identity (`hgnc_id`) is immutable once created by the identity
/// normalization source; display fields are refreshed on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneRecord {
    /// Stable ontology identifier, e.g. "HGNC:7527"
    pub hgnc_id: String,
    /// Approved symbol, e.g. "MYH9"
    pub symbol: String,
    /// Approved name
    pub name: String,
    /// Alias symbols
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneRecord {
    pub fn new(hgnc_id: impl Into<String>, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            hgnc_id: hgnc_id.into(),
            symbol: symbol.into(),
            name: name.into(),
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
