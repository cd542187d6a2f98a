//! Pipeline orchestrator
//!
//! Coordinates a full annotation run: the foundational identity source
//! first (a hard barrier), then the evidence sources under a bounded
//! concurrency pool, then a single whole-population aggregate recompute.
//!
//! The orchestrator is the checkpoint's only writer. It creates the
//! checkpoint at run start, refreshes it from its own join loop after each
//! source settles, and clears it only after the recompute has committed.
//! Cancellation is honored between sources: in-flight updates drain, the
//! checkpoint stays behind for a later resume.

pub mod source_runner;
pub mod status;

pub use source_runner::SourceRunner;
pub use status::{PipelineStatus, StatusSnapshot};

use crate::config::AnnotConfig;
use crate::models::{PipelineCheckpoint, RunPhase, RunReport, SourceRunSummary, UpdateMode};
use crate::scoring::{ClassificationNormalizer, PercentileService};
use crate::sources::{FetchContext, SourceClient, FOUNDATIONAL_SOURCE};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use ngdb_common::events::{AnnotEvent, EventBus};
use ngdb_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What the caller asked the pipeline to do
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: UpdateMode,
    /// Restrict the run to one source; None runs every enabled source
    pub source: Option<String>,
    /// Restrict the run to a gene-id subset; None covers the population
    pub genes: Option<Vec<String>>,
    /// Without an explicit gene list, restrict the run to the N
    /// highest-scoring genes (evidence-bearing genes change most often)
    pub priority_limit: Option<i64>,
    /// Resume the persisted checkpoint instead of starting fresh
    pub resume: bool,
    /// Caller-assigned run id for fresh runs; a resumed checkpoint keeps
    /// its original id
    pub run_id: Uuid,
}

struct RunState {
    run_id: Uuid,
    strategy: UpdateMode,
    resumed: bool,
    summaries: Vec<SourceRunSummary>,
    started_at: chrono::DateTime<chrono::Utc>,
}

pub struct Pipeline {
    db: SqlitePool,
    event_bus: EventBus,
    status: Arc<PipelineStatus>,
    cancel: CancellationToken,
    registry: Vec<Arc<dyn SourceClient>>,
    runner: SourceRunner,
    percentiles: PercentileService,
    source_concurrency: usize,
    active_source_count: usize,
}

impl Pipeline {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        status: Arc<PipelineStatus>,
        config: &AnnotConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let registry = crate::sources::build_registry(config)
            .map_err(|e| Error::Internal(format!("Building source registry: {e}")))?;
        Ok(Self::with_registry(
            db, event_bus, status, config, cancel, registry,
        ))
    }

    /// Build a pipeline over an explicit client registry, for callers that
    /// stub providers.
    pub fn with_registry(
        db: SqlitePool,
        event_bus: EventBus,
        status: Arc<PipelineStatus>,
        config: &AnnotConfig,
        cancel: CancellationToken,
        registry: Vec<Arc<dyn SourceClient>>,
    ) -> Self {
        let runner = SourceRunner {
            db: db.clone(),
            event_bus: event_bus.clone(),
            status: status.clone(),
            normalizer: ClassificationNormalizer::new(&config.scoring),
            progress_interval: config.pipeline.progress_interval,
        };

        let percentiles =
            PercentileService::new(db.clone(), config.percentile.cache_ttl_seconds);

        // The registry is exactly the enabled clients, so the percentage
        // divisor is its evidence-bearing subset
        let active_source_count = registry.iter().filter(|c| !c.is_foundational()).count();

        Self {
            db,
            event_bus,
            status,
            cancel,
            registry,
            runner,
            percentiles,
            source_concurrency: config.pipeline.source_concurrency,
            active_source_count,
        }
    }

    /// Execute a pipeline run to completion and return its report.
    ///
    /// Infallible at this boundary: internal errors become a Failed report
    /// (with the checkpoint left in place for a resume) rather than a
    /// panicking background task.
    pub async fn run(&self, request: RunRequest) -> RunReport {
        let mut state = RunState {
            run_id: Uuid::nil(),
            strategy: request.mode,
            resumed: false,
            summaries: Vec::new(),
            started_at: Utc::now(),
        };

        match self.run_inner(request, &mut state).await {
            Ok(phase) => self.finish(state, phase),
            Err(err) => {
                tracing::error!(run_id = %state.run_id, error = %err, "Pipeline run failed");
                self.finish(state, RunPhase::Failed)
            }
        }
    }

    fn finish(&self, state: RunState, phase: RunPhase) -> RunReport {
        let report = RunReport {
            run_id: state.run_id,
            strategy: state.strategy,
            resumed: state.resumed,
            cancelled: phase == RunPhase::Cancelled,
            sources: state.summaries,
            started_at: state.started_at,
            finished_at: Utc::now(),
        };
        self.status.finish_run(phase, report.clone());
        report
    }

    async fn run_inner(&self, request: RunRequest, state: &mut RunState) -> Result<RunPhase> {
        let mut checkpoint = self.resolve_checkpoint(&request, state).await?;
        state.run_id = checkpoint.run_id;
        state.strategy = checkpoint.strategy;
        state.started_at = checkpoint.started_at;

        crate::db::checkpoints::save_checkpoint(&self.db, &checkpoint).await?;

        self.status.begin_run(
            checkpoint.run_id,
            checkpoint.strategy.as_str(),
            &checkpoint.sources_remaining,
        );
        self.event_bus.emit_lossy(AnnotEvent::PipelineRunStarted {
            run_id: checkpoint.run_id,
            strategy: checkpoint.strategy.as_str().to_string(),
            sources: checkpoint.sources_remaining.clone(),
            resumed: state.resumed,
            timestamp: Utc::now(),
        });

        tracing::info!(
            run_id = %checkpoint.run_id,
            strategy = checkpoint.strategy.as_str(),
            sources = checkpoint.sources_remaining.len(),
            resumed = state.resumed,
            "Pipeline run starting"
        );

        // Sources the resumed checkpoint already covered
        for source in &checkpoint.sources_completed {
            self.status.set_source_state(source, "skipped");
            state.summaries.push(SourceRunSummary::skipped(source));
        }

        let ctx = FetchContext {
            db: self.db.clone(),
            mode: checkpoint.strategy,
            scope: checkpoint.gene_scope.clone(),
        };

        // Foundational identity barrier: no evidence source may run against
        // an unknown population.
        if checkpoint
            .sources_remaining
            .iter()
            .any(|s| s == FOUNDATIONAL_SOURCE)
        {
            self.status.set_phase(RunPhase::Identity);
            if !self.run_identity_barrier(&ctx, &mut checkpoint, state).await? {
                // No identity population at all; the checkpoint stays with
                // the identity source unfinished so a resume retries it.
                return Ok(RunPhase::Failed);
            }
        }

        self.status.set_phase(RunPhase::Sources);
        let cancelled = self.run_evidence_sources(&ctx, &mut checkpoint, state).await?;

        if cancelled {
            tracing::info!(
                run_id = %checkpoint.run_id,
                completed = checkpoint.sources_completed.len(),
                "Pipeline run cancelled; checkpoint retained"
            );
            self.event_bus.emit_lossy(AnnotEvent::PipelineRunCancelled {
                run_id: checkpoint.run_id,
                sources_completed: checkpoint.sources_completed.len(),
                timestamp: Utc::now(),
            });
            return Ok(RunPhase::Cancelled);
        }

        // Single whole-population recompute, regardless of how many sources
        // this run touched.
        self.status.set_phase(RunPhase::Recomputing);
        self.event_bus.emit_lossy(AnnotEvent::AggregateRecomputeStarted {
            run_id: checkpoint.run_id,
            timestamp: Utc::now(),
        });

        let rank_sources: Vec<(String, &'static str)> = self
            .registry
            .iter()
            .filter_map(|c| c.rank_field().map(|f| (c.source_id().to_string(), f)))
            .collect();

        let genes_scored = crate::scoring::recompute_aggregates(
            &self.db,
            &self.percentiles,
            &rank_sources,
            self.active_source_count,
        )
        .await?;

        crate::db::checkpoints::clear_checkpoint(&self.db).await?;

        let duration_seconds = (Utc::now() - state.started_at).num_seconds().max(0) as u64;
        let succeeded = state
            .summaries
            .iter()
            .filter(|s| s.status == crate::models::SourceRunStatus::Succeeded)
            .count();
        let failed = state.summaries.len() - succeeded
            - state
                .summaries
                .iter()
                .filter(|s| s.status == crate::models::SourceRunStatus::Skipped)
                .count();

        tracing::info!(
            run_id = %checkpoint.run_id,
            succeeded,
            failed,
            genes_scored,
            duration_seconds,
            "Pipeline run completed"
        );
        self.event_bus.emit_lossy(AnnotEvent::PipelineRunCompleted {
            run_id: checkpoint.run_id,
            sources_succeeded: succeeded,
            sources_failed: failed,
            duration_seconds,
            timestamp: Utc::now(),
        });

        Ok(RunPhase::Completed)
    }

    /// Load the checkpoint being resumed, or build a fresh one.
    async fn resolve_checkpoint(
        &self,
        request: &RunRequest,
        state: &mut RunState,
    ) -> Result<PipelineCheckpoint> {
        if request.resume {
            if let Some(checkpoint) = crate::db::checkpoints::load_checkpoint(&self.db).await? {
                state.resumed = true;
                tracing::info!(
                    run_id = %checkpoint.run_id,
                    remaining = checkpoint.sources_remaining.len(),
                    "Resuming checkpointed run"
                );
                return Ok(checkpoint);
            }
            tracing::info!("No checkpoint to resume; starting a fresh run");
        }

        let sources = match &request.source {
            Some(source) => {
                if !self.registry.iter().any(|c| c.source_id() == source) {
                    return Err(Error::InvalidInput(format!(
                        "Unknown or disabled source: {source}"
                    )));
                }
                vec![source.clone()]
            }
            None => self
                .registry
                .iter()
                .map(|c| c.source_id().to_string())
                .collect(),
        };

        let gene_scope = match (&request.genes, request.priority_limit) {
            (Some(genes), _) => Some(genes.clone()),
            (None, Some(limit)) => {
                let ids = crate::db::genes::gene_ids_by_priority(&self.db, limit).await?;
                tracing::info!(scope = ids.len(), "Run scoped to highest-priority genes");
                Some(ids)
            }
            (None, None) => None,
        };

        let mut checkpoint = PipelineCheckpoint::new(request.mode, gene_scope, sources);
        checkpoint.run_id = request.run_id;
        Ok(checkpoint)
    }

    /// Run the identity source. Returns false only when it failed AND no
    /// gene population exists, in which case the run cannot proceed.
    async fn run_identity_barrier(
        &self,
        ctx: &FetchContext,
        checkpoint: &mut PipelineCheckpoint,
        state: &mut RunState,
    ) -> Result<bool> {
        let client = self
            .registry
            .iter()
            .find(|c| c.is_foundational())
            .cloned()
            .ok_or_else(|| Error::Internal("Identity source missing from registry".to_string()))?;

        let summary = self.runner.run(client, ctx, checkpoint.run_id).await;
        let identity_failed = summary.status == crate::models::SourceRunStatus::Failed;

        crate::db::source_runs::record_result(&self.db, checkpoint.run_id, &summary).await?;
        state.summaries.push(summary);

        if identity_failed {
            let known_genes = crate::db::genes::count_genes(&self.db).await?;
            if known_genes == 0 {
                tracing::error!(
                    "Identity source failed with no existing gene population; aborting run"
                );
                return Ok(false);
            }
            tracing::warn!(
                known_genes,
                "Identity source failed; continuing against the existing population"
            );
        }

        checkpoint.mark_completed(FOUNDATIONAL_SOURCE);
        crate::db::checkpoints::save_checkpoint(&self.db, checkpoint).await?;

        Ok(true)
    }

    /// Run the remaining evidence sources under the bounded pool. Returns
    /// true when the run was cancelled before every source had its turn.
    async fn run_evidence_sources(
        &self,
        ctx: &FetchContext,
        checkpoint: &mut PipelineCheckpoint,
        state: &mut RunState,
    ) -> Result<bool> {
        let queue: Vec<Arc<dyn SourceClient>> = self
            .registry
            .iter()
            .filter(|c| {
                !c.is_foundational()
                    && checkpoint
                        .sources_remaining
                        .iter()
                        .any(|s| s == c.source_id())
            })
            .cloned()
            .collect();

        let mut pending = queue.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;

        loop {
            // Top up the pool; cancellation is honored between sources only,
            // so anything already launched drains to completion.
            while in_flight.len() < self.source_concurrency {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match pending.next() {
                    Some(client) => {
                        in_flight.push(self.runner.run(client, ctx, checkpoint.run_id))
                    }
                    None => break,
                }
            }

            // Join loop: the single place checkpoints are written
            match in_flight.next().await {
                Some(summary) => {
                    crate::db::source_runs::record_result(&self.db, checkpoint.run_id, &summary)
                        .await?;
                    checkpoint.mark_completed(&summary.source);
                    crate::db::checkpoints::save_checkpoint(&self.db, checkpoint).await?;
                    state.summaries.push(summary);
                }
                None => break,
            }
        }

        Ok(cancelled && pending.next().is_some())
    }
}
