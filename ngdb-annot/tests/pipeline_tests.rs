//! Pipeline orchestration tests with stubbed source clients

use async_trait::async_trait;
use ngdb_annot::config::AnnotConfig;
use ngdb_annot::db;
use ngdb_annot::models::{
    PipelineCheckpoint, RunPhase, SourceRunStatus, UpdateMode,
};
use ngdb_annot::pipeline::{Pipeline, PipelineStatus, RunRequest};
use ngdb_annot::sources::{
    EvidenceSignal, FetchContext, FetchOutcome, GeneAnnotation, GeneFailure, SourceClient,
    SourceError,
};
use ngdb_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn test_db() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = db::init_database_pool(&dir.path().join("test.db"))
        .await
        .unwrap();
    (dir, pool)
}

fn annotation(hgnc_id: &str, labels: &[&str]) -> GeneAnnotation {
    GeneAnnotation {
        hgnc_id: Some(hgnc_id.to_string()),
        symbol: hgnc_id.to_string(),
        raw_payload: serde_json::json!({"labels": labels}),
        signal: EvidenceSignal::Classifications(
            labels.iter().map(|l| l.to_string()).collect(),
        ),
    }
}

/// Stub identity source covering a fixed gene population
struct StubIdentity {
    genes: Vec<(String, String)>,
    fail: bool,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceClient for StubIdentity {
    fn source_id(&self) -> &'static str {
        "hgnc"
    }

    fn is_foundational(&self) -> bool {
        true
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Network("provider unreachable".to_string()));
        }
        let annotations = self
            .genes
            .iter()
            .map(|(id, symbol)| GeneAnnotation {
                hgnc_id: Some(id.clone()),
                symbol: symbol.clone(),
                raw_payload: serde_json::json!({"symbol": symbol}),
                signal: EvidenceSignal::Identity {
                    name: format!("{symbol} gene"),
                    aliases: Vec::new(),
                },
            })
            .collect();
        Ok(FetchOutcome {
            annotations,
            failures: Vec::new(),
        })
    }

    async fn clear_existing_entries(&self, _db: &SqlitePool) -> Result<u64, SourceError> {
        Ok(0)
    }
}

/// Stub classification source with a canned annotation list
struct StubEvidence {
    id: &'static str,
    annotations: Vec<GeneAnnotation>,
    failures: Vec<GeneFailure>,
    fail: bool,
    fetches: Arc<AtomicUsize>,
}

impl StubEvidence {
    fn new(id: &'static str, annotations: Vec<GeneAnnotation>) -> Self {
        Self {
            id,
            annotations,
            failures: Vec::new(),
            fail: false,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceClient for StubEvidence {
    fn source_id(&self) -> &'static str {
        self.id
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SourceError::Api(500, "backend down".to_string()));
        }
        Ok(FetchOutcome {
            annotations: self.annotations.clone(),
            failures: self.failures.clone(),
        })
    }
}

/// Stub evidence source that records the gene scope its fetch received
struct ScopeRecordingEvidence {
    id: &'static str,
    seen_scope: Arc<std::sync::Mutex<Option<Vec<String>>>>,
}

#[async_trait]
impl SourceClient for ScopeRecordingEvidence {
    fn source_id(&self) -> &'static str {
        self.id
    }

    async fn fetch_raw_data(&self, ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        *self.seen_scope.lock().unwrap() = ctx.scope.clone();
        Ok(FetchOutcome::default())
    }
}

/// Stub evidence source that requests cancellation from inside its fetch,
/// standing in for an operator hitting cancel mid-run
struct CancellingEvidence {
    id: &'static str,
    token: CancellationToken,
}

#[async_trait]
impl SourceClient for CancellingEvidence {
    fn source_id(&self) -> &'static str {
        self.id
    }

    async fn fetch_raw_data(&self, _ctx: &FetchContext) -> Result<FetchOutcome, SourceError> {
        self.token.cancel();
        Ok(FetchOutcome {
            annotations: vec![annotation("HGNC:1", &["definitive"])],
            failures: Vec::new(),
        })
    }
}

fn population(n: usize) -> Vec<(String, String)> {
    (1..=n)
        .map(|i| (format!("HGNC:{i}"), format!("GENE{i}")))
        .collect()
}

fn build_pipeline(
    pool: &SqlitePool,
    registry: Vec<Arc<dyn SourceClient>>,
) -> (Pipeline, Arc<PipelineStatus>, CancellationToken) {
    build_pipeline_with_config(pool, registry, AnnotConfig::default())
}

fn build_pipeline_with_config(
    pool: &SqlitePool,
    registry: Vec<Arc<dyn SourceClient>>,
    config: AnnotConfig,
) -> (Pipeline, Arc<PipelineStatus>, CancellationToken) {
    let status = Arc::new(PipelineStatus::new());
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::with_registry(
        pool.clone(),
        EventBus::new(64),
        status.clone(),
        &config,
        cancel.clone(),
        registry,
    );
    (pipeline, status, cancel)
}

fn fresh_request(mode: UpdateMode) -> RunRequest {
    RunRequest {
        mode,
        source: None,
        genes: None,
        priority_limit: None,
        resume: false,
        run_id: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn test_full_run_populates_scores_and_clears_checkpoint() {
    let (_dir, pool) = test_db().await;
    let identity = Arc::new(StubIdentity {
        genes: population(3),
        fail: false,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let clingen = Arc::new(StubEvidence::new(
        "clingen",
        vec![
            annotation("HGNC:1", &["definitive"]),
            annotation("HGNC:2", &["limited"]),
        ],
    ));
    let gencc = Arc::new(StubEvidence::new(
        "gencc",
        vec![annotation("HGNC:1", &["strong"])],
    ));

    let (pipeline, status, _cancel) =
        build_pipeline(&pool, vec![identity, clingen, gencc]);
    let request = fresh_request(UpdateMode::Full);
    let run_id = request.run_id;
    let report = pipeline.run(request).await;

    assert!(!report.cancelled);
    assert_eq!(report.sources_succeeded(), 3);
    assert_eq!(status.snapshot().phase, RunPhase::Completed);

    // Every source outcome is audited under the run id
    let audited = db::source_runs::list_for_run(&pool, run_id).await.unwrap();
    assert_eq!(audited.len(), 3);
    assert!(audited.iter().all(|s| s.status == SourceRunStatus::Succeeded));

    assert_eq!(db::genes::count_genes(&pool).await.unwrap(), 3);

    // 2 evidence sources: HGNC:1 = 1.0 + 0.75 over a divisor of 2
    let score = db::scores::get_score(&pool, "HGNC:1").await.unwrap().unwrap();
    assert!((score.raw_score - 1.75).abs() < 1e-9);
    assert!((score.percentage_score - 87.5).abs() < 1e-9);

    // A completed run leaves no checkpoint behind
    assert!(db::checkpoints::load_checkpoint(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_skips_completed_sources() {
    let (_dir, pool) = test_db().await;

    // Simulated crash: a persisted checkpoint with 2 of 4 sources done
    let mut checkpoint = PipelineCheckpoint::new(
        UpdateMode::Incremental,
        None,
        vec![
            "hgnc".to_string(),
            "clingen".to_string(),
            "gencc".to_string(),
            "panelapp".to_string(),
        ],
    );
    checkpoint.mark_completed("hgnc");
    checkpoint.mark_completed("clingen");
    db::checkpoints::save_checkpoint(&pool, &checkpoint).await.unwrap();
    db::genes::upsert_gene(
        &pool,
        &ngdb_annot::models::GeneRecord::new("HGNC:1", "GENE1", "GENE1 gene"),
    )
    .await
    .unwrap();

    let identity_fetches = Arc::new(AtomicUsize::new(0));
    let identity = Arc::new(StubIdentity {
        genes: population(1),
        fail: false,
        fetches: identity_fetches.clone(),
    });
    let clingen = Arc::new(StubEvidence::new(
        "clingen",
        vec![annotation("HGNC:1", &["definitive"])],
    ));
    let clingen_fetches = clingen.fetches.clone();
    let gencc = Arc::new(StubEvidence::new(
        "gencc",
        vec![annotation("HGNC:1", &["moderate"])],
    ));
    let gencc_fetches = gencc.fetches.clone();
    let panelapp = Arc::new(StubEvidence::new(
        "panelapp",
        vec![annotation("HGNC:1", &["green"])],
    ));

    let (pipeline, _status, _cancel) =
        build_pipeline(&pool, vec![identity, clingen, gencc, panelapp]);
    let report = pipeline
        .run(RunRequest {
            mode: UpdateMode::Incremental,
            source: None,
            genes: None,
            priority_limit: None,
            resume: true,
            run_id: Uuid::new_v4(),
        })
        .await;

    assert!(report.resumed);
    assert_eq!(report.run_id, checkpoint.run_id);

    // Completed sources had their turn; only the remaining two fetched
    assert_eq!(identity_fetches.load(Ordering::SeqCst), 0);
    assert_eq!(clingen_fetches.load(Ordering::SeqCst), 0);
    assert_eq!(gencc_fetches.load(Ordering::SeqCst), 1);

    let skipped: Vec<_> = report
        .sources
        .iter()
        .filter(|s| s.status == SourceRunStatus::Skipped)
        .map(|s| s.source.clone())
        .collect();
    assert!(skipped.contains(&"hgnc".to_string()));
    assert!(skipped.contains(&"clingen".to_string()));

    assert!(db::checkpoints::load_checkpoint(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_mode_deletes_stale_records_incremental_retains() {
    let (_dir, pool) = test_db().await;
    db::genes::upsert_gene(
        &pool,
        &ngdb_annot::models::GeneRecord::new("HGNC:9", "OLD1", "old gene"),
    )
    .await
    .unwrap();

    // A gene the provider no longer reports
    let stale = ngdb_annot::models::EvidenceRecord {
        hgnc_id: "HGNC:9".to_string(),
        source_id: "clingen".to_string(),
        raw_payload: serde_json::json!({}),
        normalized_weight: 1.0,
        updated_at: chrono::Utc::now(),
    };
    db::evidence::upsert_evidence(&pool, &stale).await.unwrap();

    let make_registry = || -> Vec<Arc<dyn SourceClient>> {
        vec![
            Arc::new(StubIdentity {
                genes: population(1),
                fail: false,
                fetches: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(StubEvidence::new(
                "clingen",
                vec![annotation("HGNC:1", &["strong"])],
            )),
        ]
    };

    // Incremental: the stale row survives
    let (pipeline, _, _) = build_pipeline(&pool, make_registry());
    pipeline.run(fresh_request(UpdateMode::Incremental)).await;
    assert!(db::evidence::get_evidence(&pool, "HGNC:9", "clingen")
        .await
        .unwrap()
        .is_some());

    // Full: clear-then-repopulate removes it
    let (pipeline, _, _) = build_pipeline(&pool, make_registry());
    let report = pipeline.run(fresh_request(UpdateMode::Full)).await;
    assert_eq!(report.sources_failed(), 0);
    assert!(db::evidence::get_evidence(&pool, "HGNC:9", "clingen")
        .await
        .unwrap()
        .is_none());
    assert!(db::evidence::get_evidence(&pool, "HGNC:1", "clingen")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_failing_source_does_not_abort_run() {
    let (_dir, pool) = test_db().await;
    let identity = Arc::new(StubIdentity {
        genes: population(2),
        fail: false,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let mut broken = StubEvidence::new("clingen", Vec::new());
    broken.fail = true;
    let healthy = Arc::new(StubEvidence::new(
        "gencc",
        vec![annotation("HGNC:1", &["definitive"])],
    ));

    let (pipeline, status, _cancel) =
        build_pipeline(&pool, vec![identity, Arc::new(broken), healthy]);
    let report = pipeline.run(fresh_request(UpdateMode::Incremental)).await;

    assert_eq!(report.sources_failed(), 1);
    assert_eq!(report.sources_succeeded(), 2);
    // The run as a whole still completes and recomputes
    assert_eq!(status.snapshot().phase, RunPhase::Completed);
    assert!(db::scores::get_score(&pool, "HGNC:1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_full_update_retains_existing_evidence() {
    let (_dir, pool) = test_db().await;
    db::genes::upsert_gene(
        &pool,
        &ngdb_annot::models::GeneRecord::new("HGNC:1", "GENE1", "GENE1 gene"),
    )
    .await
    .unwrap();
    let existing = ngdb_annot::models::EvidenceRecord {
        hgnc_id: "HGNC:1".to_string(),
        source_id: "clingen".to_string(),
        raw_payload: serde_json::json!({"classification": "definitive"}),
        normalized_weight: 1.0,
        updated_at: chrono::Utc::now(),
    };
    db::evidence::upsert_evidence(&pool, &existing).await.unwrap();

    let identity = Arc::new(StubIdentity {
        genes: population(1),
        fail: false,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let mut broken = StubEvidence::new("clingen", Vec::new());
    broken.fail = true;

    let (pipeline, _status, _cancel) = build_pipeline(&pool, vec![identity, Arc::new(broken)]);
    let report = pipeline.run(fresh_request(UpdateMode::Full)).await;

    // A provider outage during a full run must not wipe the evidence it
    // was supposed to replace
    assert_eq!(report.sources_failed(), 1);
    let survivor = db::evidence::get_evidence(&pool, "HGNC:1", "clingen")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(survivor.normalized_weight, 1.0);
}

#[tokio::test]
async fn test_gene_failures_are_isolated() {
    let (_dir, pool) = test_db().await;
    let identity = Arc::new(StubIdentity {
        genes: population(100),
        fail: false,
        fetches: Arc::new(AtomicUsize::new(0)),
    });

    let mut annotations = Vec::new();
    for i in 1..=99 {
        annotations.push(annotation(&format!("HGNC:{i}"), &["green"]));
    }
    let mut source = StubEvidence::new("panelapp", annotations);
    source.failures.push(GeneFailure {
        identifier: "HGNC:100".to_string(),
        reason: "malformed entry".to_string(),
    });

    let (pipeline, _status, _cancel) = build_pipeline(&pool, vec![identity, Arc::new(source)]);
    let report = pipeline.run(fresh_request(UpdateMode::Full)).await;

    let summary = report
        .sources
        .iter()
        .find(|s| s.source == "panelapp")
        .unwrap();
    assert_eq!(summary.status, SourceRunStatus::Succeeded);
    assert_eq!(summary.genes_updated, 99);
    assert_eq!(summary.genes_failed, 1);
    assert!(!summary.sampled_failures.is_empty());
    assert_eq!(
        db::evidence::count_for_source(&pool, "panelapp").await.unwrap(),
        99
    );
}

#[tokio::test]
async fn test_identity_failure_with_empty_population_aborts() {
    let (_dir, pool) = test_db().await;
    let identity = Arc::new(StubIdentity {
        genes: Vec::new(),
        fail: true,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let evidence = Arc::new(StubEvidence::new(
        "clingen",
        vec![annotation("HGNC:1", &["definitive"])],
    ));
    let evidence_fetches = evidence.fetches.clone();

    let (pipeline, status, _cancel) = build_pipeline(&pool, vec![identity, evidence]);
    let report = pipeline.run(fresh_request(UpdateMode::Full)).await;

    assert_eq!(status.snapshot().phase, RunPhase::Failed);
    assert_eq!(report.sources_failed(), 1);
    // No evidence source ran against the unknown population
    assert_eq!(evidence_fetches.load(Ordering::SeqCst), 0);

    // The checkpoint survives with the identity source still pending
    let checkpoint = db::checkpoints::load_checkpoint(&pool).await.unwrap().unwrap();
    assert!(checkpoint
        .sources_remaining
        .contains(&"hgnc".to_string()));
}

#[tokio::test]
async fn test_identity_failure_with_existing_population_continues() {
    let (_dir, pool) = test_db().await;
    db::genes::upsert_gene(
        &pool,
        &ngdb_annot::models::GeneRecord::new("HGNC:1", "GENE1", "GENE1 gene"),
    )
    .await
    .unwrap();

    let identity = Arc::new(StubIdentity {
        genes: Vec::new(),
        fail: true,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let evidence = Arc::new(StubEvidence::new(
        "clingen",
        vec![annotation("HGNC:1", &["definitive"])],
    ));

    let (pipeline, status, _cancel) = build_pipeline(&pool, vec![identity, evidence]);
    let report = pipeline.run(fresh_request(UpdateMode::Incremental)).await;

    // Identity failed but the run proceeded against the known population
    assert_eq!(status.snapshot().phase, RunPhase::Completed);
    assert_eq!(report.sources_failed(), 1);
    assert_eq!(report.sources_succeeded(), 1);
    assert!(db::scores::get_score(&pool, "HGNC:1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unmatched_symbol_is_staged_not_scored() {
    let (_dir, pool) = test_db().await;
    let identity = Arc::new(StubIdentity {
        genes: population(1),
        fail: false,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let evidence = Arc::new(StubEvidence::new(
        "gencc",
        vec![GeneAnnotation {
            hgnc_id: None,
            symbol: "NOT_A_GENE".to_string(),
            raw_payload: serde_json::json!({}),
            signal: EvidenceSignal::Classifications(vec!["strong".to_string()]),
        }],
    ));

    let (pipeline, _status, _cancel) = build_pipeline(&pool, vec![identity, evidence]);
    let report = pipeline.run(fresh_request(UpdateMode::Full)).await;

    let summary = report.sources.iter().find(|s| s.source == "gencc").unwrap();
    assert_eq!(summary.genes_updated, 0);
    assert_eq!(summary.genes_failed, 1);
    assert_eq!(db::evidence::count_for_source(&pool, "gencc").await.unwrap(), 0);
}

fn seeded_score(hgnc_id: &str, raw: f64) -> ngdb_annot::models::AggregateScore {
    ngdb_annot::models::AggregateScore {
        hgnc_id: hgnc_id.to_string(),
        raw_score: raw,
        percentage_score: raw * 10.0,
        source_count: 1,
        percentiles: std::collections::HashMap::new(),
        computed_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_priority_limit_scopes_run_to_top_scoring_genes() {
    let (_dir, pool) = test_db().await;
    for (id, symbol) in population(3) {
        db::genes::upsert_gene(
            &pool,
            &ngdb_annot::models::GeneRecord::new(
                id.as_str(),
                symbol.as_str(),
                format!("{symbol} gene").as_str(),
            ),
        )
        .await
        .unwrap();
    }
    db::scores::replace_aggregate_scores(
        &pool,
        &[
            seeded_score("HGNC:1", 1.0),
            seeded_score("HGNC:2", 5.0),
            seeded_score("HGNC:3", 3.0),
        ],
    )
    .await
    .unwrap();

    let seen_scope = Arc::new(std::sync::Mutex::new(None));
    let identity = Arc::new(StubIdentity {
        genes: population(3),
        fail: false,
        fetches: Arc::new(AtomicUsize::new(0)),
    });
    let recorder = Arc::new(ScopeRecordingEvidence {
        id: "clingen",
        seen_scope: seen_scope.clone(),
    });

    let (pipeline, _status, _cancel) = build_pipeline(&pool, vec![identity, recorder]);
    pipeline
        .run(RunRequest {
            mode: UpdateMode::Incremental,
            source: None,
            genes: None,
            priority_limit: Some(2),
            resume: false,
            run_id: Uuid::new_v4(),
        })
        .await;

    // The two strongest-scoring genes, strongest first
    let scope = seen_scope.lock().unwrap().clone();
    assert_eq!(
        scope,
        Some(vec!["HGNC:2".to_string(), "HGNC:3".to_string()])
    );
}

#[tokio::test]
async fn test_cancel_between_sources_retains_checkpoint_for_resume() {
    let (_dir, pool) = test_db().await;

    let mut config = AnnotConfig::default();
    config.pipeline.source_concurrency = 1;

    let status = Arc::new(PipelineStatus::new());
    let cancel = CancellationToken::new();
    let gencc = Arc::new(StubEvidence::new(
        "gencc",
        vec![annotation("HGNC:1", &["strong"])],
    ));
    let gencc_fetches = gencc.fetches.clone();
    let registry: Vec<Arc<dyn SourceClient>> = vec![
        Arc::new(StubIdentity {
            genes: population(1),
            fail: false,
            fetches: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(CancellingEvidence {
            id: "clingen",
            token: cancel.clone(),
        }),
        gencc,
    ];
    let pipeline = Pipeline::with_registry(
        pool.clone(),
        EventBus::new(64),
        status.clone(),
        &config,
        cancel.clone(),
        registry,
    );

    let report = pipeline.run(fresh_request(UpdateMode::Full)).await;

    // Cancellation lands between sources: the in-flight source drained,
    // the unlaunched one stayed behind in the checkpoint
    assert!(report.cancelled);
    assert_eq!(status.snapshot().phase, RunPhase::Cancelled);
    assert_eq!(gencc_fetches.load(Ordering::SeqCst), 0);

    let checkpoint = db::checkpoints::load_checkpoint(&pool).await.unwrap().unwrap();
    assert!(checkpoint.sources_remaining.contains(&"gencc".to_string()));
    assert!(!checkpoint.sources_remaining.contains(&"clingen".to_string()));

    // A resumed run picks up the leftover source and finishes the job
    let resume_gencc = Arc::new(StubEvidence::new(
        "gencc",
        vec![annotation("HGNC:1", &["strong"])],
    ));
    let resume_fetches = resume_gencc.fetches.clone();
    let (pipeline, status, _cancel) = build_pipeline(
        &pool,
        vec![
            Arc::new(StubIdentity {
                genes: population(1),
                fail: false,
                fetches: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(StubEvidence::new(
                "clingen",
                vec![annotation("HGNC:1", &["definitive"])],
            )),
            resume_gencc,
        ],
    );
    let report = pipeline
        .run(RunRequest {
            mode: UpdateMode::Full,
            source: None,
            genes: None,
            priority_limit: None,
            resume: true,
            run_id: Uuid::new_v4(),
        })
        .await;

    assert!(report.resumed);
    assert_eq!(report.run_id, checkpoint.run_id);
    assert_eq!(status.snapshot().phase, RunPhase::Completed);
    assert_eq!(resume_fetches.load(Ordering::SeqCst), 1);
    assert!(db::checkpoints::load_checkpoint(&pool).await.unwrap().is_none());
}
