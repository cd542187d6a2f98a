//! Shared pipeline status board
//!
//! One instance lives in application state. The orchestrator writes to it
//! as the run advances; the status endpoints read cheap snapshots. The
//! atomic `running` flag is also the single-run guard: only the caller
//! that wins `try_begin` may start a run.

use crate::models::{RunPhase, RunReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// Live per-source progress inside the current run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProgress {
    /// "pending", "running", "succeeded", "failed", "skipped"
    pub state: String,
    pub genes_processed: usize,
    pub genes_failed: usize,
}

impl SourceProgress {
    fn pending() -> Self {
        Self {
            state: "pending".to_string(),
            genes_processed: 0,
            genes_failed: 0,
        }
    }
}

/// Point-in-time view of the pipeline, serialized by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: RunPhase,
    pub run_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub sources: HashMap<String, SourceProgress>,
    pub started_at: Option<DateTime<Utc>>,
    /// Report of the most recently finished run, if any
    pub last_report: Option<RunReport>,
}

impl StatusSnapshot {
    fn idle() -> Self {
        Self {
            phase: RunPhase::Idle,
            run_id: None,
            strategy: None,
            sources: HashMap::new(),
            started_at: None,
            last_report: None,
        }
    }
}

pub struct PipelineStatus {
    running: AtomicBool,
    inner: RwLock<StatusSnapshot>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStatus {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            inner: RwLock::new(StatusSnapshot::idle()),
        }
    }

    /// Claim the single run slot. Returns false when a run is already
    /// active, in which case the caller must not start another.
    pub fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the run slot without recording a report, for runs that
    /// failed before starting.
    pub fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn begin_run(&self, run_id: Uuid, strategy: &str, sources: &[String]) {
        self.with_inner(|inner| {
            let last_report = inner.last_report.take();
            *inner = StatusSnapshot::idle();
            inner.last_report = last_report;
            inner.phase = RunPhase::Identity;
            inner.run_id = Some(run_id);
            inner.strategy = Some(strategy.to_string());
            inner.started_at = Some(Utc::now());
            for source in sources {
                inner
                    .sources
                    .insert(source.clone(), SourceProgress::pending());
            }
        });
    }

    pub fn set_phase(&self, phase: RunPhase) {
        self.with_inner(|inner| inner.phase = phase);
    }

    pub fn set_source_state(&self, source: &str, state: &str) {
        self.with_inner(|inner| {
            inner
                .sources
                .entry(source.to_string())
                .or_insert_with(SourceProgress::pending)
                .state = state.to_string();
        });
    }

    pub fn set_source_progress(&self, source: &str, processed: usize, failed: usize) {
        self.with_inner(|inner| {
            let progress = inner
                .sources
                .entry(source.to_string())
                .or_insert_with(SourceProgress::pending);
            progress.genes_processed = processed;
            progress.genes_failed = failed;
        });
    }

    /// Record the finished run and release the single-run slot.
    pub fn finish_run(&self, phase: RunPhase, report: RunReport) {
        self.with_inner(|inner| {
            inner.phase = phase;
            inner.last_report = Some(report);
        });
        self.running.store(false, Ordering::SeqCst);
    }

    fn with_inner(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdateMode;

    #[test]
    fn test_single_run_guard() {
        let status = PipelineStatus::new();
        assert!(status.try_begin());
        assert!(!status.try_begin());
        assert!(status.is_running());

        let report = RunReport {
            run_id: Uuid::new_v4(),
            strategy: UpdateMode::Full,
            resumed: false,
            cancelled: false,
            sources: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        status.finish_run(RunPhase::Completed, report);
        assert!(!status.is_running());
        assert!(status.try_begin());
    }

    #[test]
    fn test_snapshot_tracks_source_progress() {
        let status = PipelineStatus::new();
        let run_id = Uuid::new_v4();
        status.begin_run(run_id, "full", &["hgnc".to_string(), "gencc".to_string()]);
        status.set_source_state("gencc", "running");
        status.set_source_progress("gencc", 50, 2);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.run_id, Some(run_id));
        assert_eq!(snapshot.sources["gencc"].state, "running");
        assert_eq!(snapshot.sources["gencc"].genes_processed, 50);
        assert_eq!(snapshot.sources["gencc"].genes_failed, 2);
        assert_eq!(snapshot.sources["hgnc"].state, "pending");
    }
}
