//! Persisted pipeline run state
//!
//! The checkpoint is what makes crash-resume possible: it is created at run
//! start, refreshed after each source completes, deleted on successful
//! completion, and read back when a restarted process resumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Update strategy for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Upsert per-gene records; genes no longer reported stay in place
    Incremental,
    /// Delete each source's existing records before repopulating, so a
    /// gene dropped by the provider is actually removed
    Full,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Incremental => "incremental",
            UpdateMode::Full => "full",
        }
    }
}

impl std::str::FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(UpdateMode::Incremental),
            "full" => Ok(UpdateMode::Full),
            other => Err(format!("Unknown update mode: {other}")),
        }
    }
}

/// Process-wide persisted state for an in-flight pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub run_id: Uuid,
    pub strategy: UpdateMode,
    /// None = full population; Some = explicit gene-id subset
    pub gene_scope: Option<Vec<String>>,
    pub sources_remaining: Vec<String>,
    pub sources_completed: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineCheckpoint {
    pub fn new(strategy: UpdateMode, gene_scope: Option<Vec<String>>, sources: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            strategy,
            gene_scope,
            sources_remaining: sources,
            sources_completed: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Move a source from remaining to completed.
    ///
    /// Failed sources are also marked completed for checkpoint purposes:
    /// resuming a run must not re-fetch a source that already had its turn.
    pub fn mark_completed(&mut self, source: &str) {
        self.sources_remaining.retain(|s| s != source);
        if !self.sources_completed.iter().any(|s| s == source) {
            self.sources_completed.push(source.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        self.sources_remaining.is_empty()
    }
}
