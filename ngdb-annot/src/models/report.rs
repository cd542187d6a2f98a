//! Run reports and status types

use super::UpdateMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse phase of the pipeline, surfaced by the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunPhase {
    /// No run active
    Idle,
    /// Foundational identity source running (hard barrier)
    Identity,
    /// Evidence sources running under the bounded pool
    Sources,
    /// Single whole-population recompute after all sources
    Recomputing,
    Completed,
    Cancelled,
    Failed,
}

/// Outcome of one source within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceRunStatus {
    Succeeded,
    Failed,
    /// Already completed by the run this one resumed
    Skipped,
}

impl SourceRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceRunStatus::Succeeded => "SUCCEEDED",
            SourceRunStatus::Failed => "FAILED",
            SourceRunStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::str::FromStr for SourceRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(SourceRunStatus::Succeeded),
            "FAILED" => Ok(SourceRunStatus::Failed),
            "SKIPPED" => Ok(SourceRunStatus::Skipped),
            other => Err(format!("Unknown source run status: {other}")),
        }
    }
}

/// Per-source result inside a run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRunSummary {
    pub source: String,
    pub status: SourceRunStatus,
    pub genes_updated: usize,
    pub genes_failed: usize,
    /// Stale records deleted before repopulation (full mode)
    pub records_deleted: usize,
    /// Up to a handful of representative failure reasons; the full list
    /// would be unbounded on a bad day
    pub sampled_failures: Vec<String>,
    /// Source-level error when status is Failed
    pub error: Option<String>,
}

impl SourceRunSummary {
    pub fn skipped(source: &str) -> Self {
        Self {
            source: source.to_string(),
            status: SourceRunStatus::Skipped,
            genes_updated: 0,
            genes_failed: 0,
            records_deleted: 0,
            sampled_failures: Vec::new(),
            error: None,
        }
    }

    pub fn failed(source: &str, error: String) -> Self {
        Self {
            source: source.to_string(),
            status: SourceRunStatus::Failed,
            genes_updated: 0,
            genes_failed: 0,
            records_deleted: 0,
            sampled_failures: Vec::new(),
            error: Some(error),
        }
    }
}

/// Structured summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub strategy: UpdateMode,
    pub resumed: bool,
    pub cancelled: bool,
    pub sources: Vec<SourceRunSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn sources_succeeded(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.status == SourceRunStatus::Succeeded)
            .count()
    }

    pub fn sources_failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.status == SourceRunStatus::Failed)
            .count()
    }
}
