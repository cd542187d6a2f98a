//! Per-source update execution
//!
//! Runs one source's update end to end: clear (full mode), fetch, resolve
//! identities, normalize, persist. A failure on one gene is isolated and
//! recorded; a failure of the source as a whole produces a Failed summary
//! and the run moves on to the remaining sources.

use crate::models::{EvidenceRecord, GeneRecord, SourceRunStatus, SourceRunSummary, UpdateMode};
use crate::pipeline::status::PipelineStatus;
use crate::scoring::ClassificationNormalizer;
use crate::sources::{EvidenceSignal, FetchContext, GeneAnnotation, SourceClient};
use chrono::Utc;
use ngdb_common::events::{AnnotEvent, EventBus};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Representative failure reasons kept per source; the full list would be
/// unbounded on a bad day.
const FAILURE_SAMPLE_LIMIT: usize = 5;

pub struct SourceRunner {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub status: Arc<PipelineStatus>,
    pub normalizer: ClassificationNormalizer,
    pub progress_interval: usize,
}

impl SourceRunner {
    /// Run one source's update within `run_id` and return its summary.
    ///
    /// Never returns Err: every failure mode is folded into the summary so
    /// the orchestrator's join loop stays a pure bookkeeping loop.
    pub async fn run(
        &self,
        client: Arc<dyn SourceClient>,
        ctx: &FetchContext,
        run_id: Uuid,
    ) -> SourceRunSummary {
        let source = client.source_id();
        tracing::info!(source, mode = ctx.mode.as_str(), "Source update starting");

        self.status.set_source_state(source, "running");
        self.event_bus.emit_lossy(AnnotEvent::SourceUpdateStarted {
            run_id,
            source: source.to_string(),
            timestamp: Utc::now(),
        });

        let outcome = match client.fetch_raw_data(ctx).await {
            Ok(outcome) => outcome,
            Err(err) => return self.fail(source, run_id, err.to_string()),
        };

        // Full-mode deletion happens only once the replacement data is in
        // hand; a provider outage must never leave the source's evidence
        // wiped with nothing to repopulate it.
        let records_deleted = if ctx.mode == UpdateMode::Full {
            match client.clear_existing_entries(&self.db).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(source, deleted = count, "Cleared stale records");
                    }
                    count as usize
                }
                Err(err) => {
                    return self.fail(source, run_id, format!("Clearing records: {err}"));
                }
            }
        } else {
            0
        };

        let mut summary = SourceRunSummary {
            source: source.to_string(),
            status: SourceRunStatus::Succeeded,
            genes_updated: 0,
            genes_failed: outcome.failures.len(),
            records_deleted,
            sampled_failures: Vec::new(),
            error: None,
        };

        for failure in &outcome.failures {
            tracing::warn!(
                source,
                identifier = %failure.identifier,
                reason = %failure.reason,
                "Gene entry skipped"
            );
            if summary.sampled_failures.len() < FAILURE_SAMPLE_LIMIT {
                summary
                    .sampled_failures
                    .push(format!("{}: {}", failure.identifier, failure.reason));
            }
        }

        let total = outcome.annotations.len();
        let interval = self.progress_interval.max(1);
        for (index, annotation) in outcome.annotations.into_iter().enumerate() {
            match self.persist(source, client.rank_field(), annotation).await {
                Ok(true) => summary.genes_updated += 1,
                // Unmatched symbol, staged for manual review
                Ok(false) => summary.genes_failed += 1,
                Err(reason) => {
                    summary.genes_failed += 1;
                    if summary.sampled_failures.len() < FAILURE_SAMPLE_LIMIT {
                        summary.sampled_failures.push(reason);
                    }
                }
            }

            let processed = index + 1;
            if processed % interval == 0 || processed == total {
                self.status
                    .set_source_progress(source, processed, summary.genes_failed);
                self.event_bus.emit_lossy(AnnotEvent::SourceUpdateProgress {
                    run_id,
                    source: source.to_string(),
                    genes_processed: processed,
                    genes_failed: summary.genes_failed,
                    current_operation: format!("Persisting annotations ({processed}/{total})"),
                    timestamp: Utc::now(),
                });
            }
        }

        tracing::info!(
            source,
            updated = summary.genes_updated,
            failed = summary.genes_failed,
            deleted = summary.records_deleted,
            "Source update completed"
        );

        self.status.set_source_state(source, "succeeded");
        self.event_bus.emit_lossy(AnnotEvent::SourceUpdateCompleted {
            run_id,
            source: source.to_string(),
            genes_updated: summary.genes_updated,
            genes_failed: summary.genes_failed,
            records_deleted: summary.records_deleted,
            timestamp: Utc::now(),
        });

        summary
    }

    /// Persist one annotation. Ok(true) = written, Ok(false) = symbol
    /// staged for review instead, Err = isolated per-gene failure.
    async fn persist(
        &self,
        source: &'static str,
        rank_field: Option<&'static str>,
        annotation: GeneAnnotation,
    ) -> Result<bool, String> {
        // The identity source creates/refreshes the gene row itself
        if let EvidenceSignal::Identity { name, aliases } = &annotation.signal {
            let hgnc_id = annotation
                .hgnc_id
                .as_deref()
                .ok_or_else(|| format!("{}: identity entry without hgnc_id", annotation.symbol))?;

            let mut gene = GeneRecord::new(hgnc_id, annotation.symbol.as_str(), name.as_str());
            gene.aliases = aliases.clone();
            crate::db::genes::upsert_gene(&self.db, &gene)
                .await
                .map_err(|e| format!("{hgnc_id}: {e}"))?;
            return Ok(true);
        }

        let hgnc_id = match self.resolve_identity(source, &annotation).await? {
            Some(id) => id,
            None => return Ok(false),
        };

        let normalized = self.normalizer.normalize(source, &annotation.signal);

        let record = EvidenceRecord {
            hgnc_id: hgnc_id.clone(),
            source_id: source.to_string(),
            raw_payload: annotation.raw_payload,
            normalized_weight: normalized.weight,
            updated_at: Utc::now(),
        };
        crate::db::evidence::upsert_evidence(&self.db, &record)
            .await
            .map_err(|e| format!("{hgnc_id}: {e}"))?;

        if let (Some(field), Some((_, value))) = (rank_field, normalized.rank) {
            crate::db::evidence::upsert_score_view(&self.db, source, &hgnc_id, field, value)
                .await
                .map_err(|e| format!("{hgnc_id}: {e}"))?;
        }

        Ok(true)
    }

    /// Map an annotation to a canonical gene id, or stage its symbol for
    /// manual review when no exact match exists.
    async fn resolve_identity(
        &self,
        source: &'static str,
        annotation: &GeneAnnotation,
    ) -> Result<Option<String>, String> {
        if let Some(id) = &annotation.hgnc_id {
            return Ok(Some(id.clone()));
        }

        let resolved = crate::db::genes::resolve_symbol(&self.db, &annotation.symbol)
            .await
            .map_err(|e| format!("{}: {e}", annotation.symbol))?;

        match resolved {
            Some(id) => Ok(Some(id)),
            None => {
                tracing::warn!(
                    source,
                    symbol = %annotation.symbol,
                    "Symbol has no canonical match; staged for review"
                );
                crate::db::genes::stage_symbol_candidate(&self.db, &annotation.symbol, None, source)
                    .await
                    .map_err(|e| format!("{}: {e}", annotation.symbol))?;
                Ok(None)
            }
        }
    }

    fn fail(&self, source: &'static str, run_id: Uuid, error: String) -> SourceRunSummary {
        tracing::error!(source, error = %error, "Source update failed");
        self.status.set_source_state(source, "failed");
        self.event_bus.emit_lossy(AnnotEvent::SourceUpdateFailed {
            run_id,
            source: source.to_string(),
            error: error.clone(),
            timestamp: Utc::now(),
        });
        SourceRunSummary::failed(source, error)
    }
}
