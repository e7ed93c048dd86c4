//! Wires the pipeline stages together and owns their shared control state:
//! the manual scan trigger, the watch loop, the drip handle and health.

use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::config::Config;
use crate::services::drip::{DbSyncQueue, DripError, DripHandle, DripState, DripWorker};
use crate::services::drive::{DriveClient, ServiceAccountAuth};
use crate::services::embedding::{EmbedReport, EmbeddingWorker, GeminiEmbedder, PgVectorStore};
use crate::services::enrichment::classifier::LlmClassifier;
use crate::services::enrichment::{DbEnrichmentStore, EnrichOptions, EnrichReport, EnrichmentWorker};
use crate::services::runs::{RunCounters, RunHandle};
use crate::services::scanner::{ScanError, ScanMode, ScanOutcome, Scanner};
use crate::services::shopify::ShopifyClient;
use crate::services::store::DbAssetSink;
use crate::services::sync_state::SyncStateStore;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Drip(#[from] DripError),
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub store: bool,
    /// `None` when no file tree is configured.
    pub drive_auth: Option<bool>,
    pub drip: Option<DripState>,
    pub scanning: bool,
    pub watching: bool,
    pub cached_folders: usize,
}

pub struct Pipeline {
    db: Arc<DatabaseConnection>,
    drive: Option<Arc<DriveClient>>,
    scanner: Option<Arc<Scanner>>,
    enrichment: Option<Arc<EnrichmentWorker>>,
    embedding: Option<Arc<EmbeddingWorker>>,
    drip: Option<DripHandle>,
    watch_interval: Duration,
    watcher: StdMutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            drive: None,
            scanner: None,
            enrichment: None,
            embedding: None,
            drip: None,
            watch_interval: Duration::from_secs(300),
            watcher: StdMutex::new(None),
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<Scanner>, drive: Option<Arc<DriveClient>>) -> Self {
        self.scanner = Some(scanner);
        self.drive = drive;
        self
    }

    pub fn with_enrichment(mut self, worker: Arc<EnrichmentWorker>) -> Self {
        self.enrichment = Some(worker);
        self
    }

    pub fn with_embedding(mut self, worker: Arc<EmbeddingWorker>) -> Self {
        self.embedding = Some(worker);
        self
    }

    pub fn with_drip(mut self, drip: DripHandle) -> Self {
        self.drip = Some(drip);
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Builds every stage whose configuration is present. A stage that
    /// fails to initialise is logged and left disabled.
    pub fn from_config(db: Arc<DatabaseConnection>, config: &Config) -> Self {
        let mut pipeline = Self::new(db.clone()).with_watch_interval(Duration::from_secs(config.watch_interval_secs));

        if let Some(drive) = &config.drive {
            let http = reqwest::Client::new();
            match ServiceAccountAuth::from_file(http.clone(), &drive.service_account_path) {
                Ok(auth) => {
                    let client = Arc::new(DriveClient::new(http, auth));
                    let scanner = Scanner::new(
                        client.clone(),
                        Arc::new(DbAssetSink::new(db.clone())),
                        SyncStateStore::new(config.sync_state_path.clone()),
                        drive.root_folder_id.clone(),
                    );
                    pipeline = pipeline.with_scanner(Arc::new(scanner), Some(client));
                }
                Err(e) => tracing::warn!("Pipeline | File tree disabled: {}", e),
            }
        }

        let catalog = match &config.shopify {
            Some(shopify) => match ShopifyClient::new(shopify) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("Pipeline | Catalog client disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        if let Some(llm) = &config.llm {
            match LlmClassifier::new(llm.clone()) {
                Ok(classifier) => {
                    let mut worker =
                        EnrichmentWorker::new(Arc::new(classifier), Arc::new(DbEnrichmentStore::new(db.clone())));
                    if config.push_tags {
                        if let Some(catalog) = &catalog {
                            worker = worker.with_tag_push(catalog.clone());
                        }
                    }
                    pipeline = pipeline.with_enrichment(Arc::new(worker));
                }
                Err(e) => tracing::warn!("Pipeline | Enrichment disabled: {}", e),
            }
        }

        if let Some(embedding) = &config.embedding {
            match GeminiEmbedder::new(embedding.clone()) {
                Ok(embedder) => {
                    let worker = EmbeddingWorker::new(Arc::new(embedder), Arc::new(PgVectorStore::new(db.clone())));
                    pipeline = pipeline.with_embedding(Arc::new(worker));
                }
                Err(e) => tracing::warn!("Pipeline | Embeddings disabled: {}", e),
            }
        }

        if let Some(catalog) = catalog {
            let worker = DripWorker::new(
                Arc::new(DbSyncQueue::new(db.clone())),
                catalog,
                config.image_base_url.clone(),
            );
            pipeline = pipeline.with_drip(DripHandle::spawn(worker));
        }

        pipeline
    }

    pub fn db(&self) -> &Arc<DatabaseConnection> {
        &self.db
    }

    pub fn drip(&self) -> Option<&DripHandle> {
        self.drip.as_ref()
    }

    pub fn drive(&self) -> Option<&Arc<DriveClient>> {
        self.drive.as_ref()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.as_ref().is_some_and(|s| s.is_running())
    }

    /// Runs a scan and records it. A trigger while another scan is in flight
    /// answers `already_running` without opening a run row.
    pub async fn scan(&self, mode: ScanMode) -> Result<ScanOutcome, PipelineError> {
        let scanner = self.scanner.as_ref().ok_or(PipelineError::NotConfigured("file tree"))?;
        if scanner.is_running() {
            return Ok(ScanOutcome::AlreadyRunning);
        }

        let run = RunHandle::start(&self.db, mode.run_type()).await;
        match scanner.scan(mode).await {
            Ok(ScanOutcome::Completed(report)) => {
                let counters = RunCounters {
                    processed: report.ingest.received as u64,
                    succeeded: report.ingest.inserted,
                    failed: (report.ingest.failed + report.listing_errors) as u64,
                };
                run.complete(counters, serde_json::to_value(&report).unwrap_or_default())
                    .await;
                Ok(ScanOutcome::Completed(report))
            }
            Ok(ScanOutcome::AlreadyRunning) => {
                run.complete(RunCounters::default(), serde_json::json!({"skipped": "already_running"}))
                    .await;
                Ok(ScanOutcome::AlreadyRunning)
            }
            Err(e) => {
                run.fail(RunCounters::default(), &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    pub fn enrichment(&self) -> Option<&Arc<EnrichmentWorker>> {
        self.enrichment.as_ref()
    }

    pub async fn enrich(&self, options: EnrichOptions) -> Result<EnrichReport, PipelineError> {
        let lanes = self.enrichment.as_ref().map(|w| w.lanes()).unwrap_or(1);
        self.enrich_with_lanes(options, lanes).await
    }

    pub async fn enrich_with_lanes(&self, options: EnrichOptions, lanes: usize) -> Result<EnrichReport, PipelineError> {
        let worker = self.enrichment.as_ref().ok_or(PipelineError::NotConfigured("classifier"))?;
        let run = RunHandle::start(&self.db, "enrichment").await;
        match worker.run_with_lanes(options, lanes).await {
            Ok(report) => {
                run.complete(enrich_counters(&report), serde_json::to_value(report).unwrap_or_default())
                    .await;
                Ok(report)
            }
            Err(e) => {
                run.fail(RunCounters::default(), &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    pub async fn embed(&self, limit: Option<u64>) -> Result<EmbedReport, PipelineError> {
        let worker = self.embedding.as_ref().ok_or(PipelineError::NotConfigured("embeddings"))?;
        let run = RunHandle::start(&self.db, "embedding").await;
        match worker.run(limit).await {
            Ok(report) => {
                let counters = RunCounters {
                    processed: report.embedded + report.errors,
                    succeeded: report.embedded,
                    failed: report.errors,
                };
                run.complete(counters, serde_json::to_value(report).unwrap_or_default())
                    .await;
                Ok(report)
            }
            Err(e) => {
                run.fail(RunCounters::default(), &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .map(|w| w.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Starts the delta-scan loop. Returns false if it was already running.
    pub fn start_watch(self: &Arc<Self>) -> Result<bool, PipelineError> {
        if self.scanner.is_none() {
            return Err(PipelineError::NotConfigured("file tree"));
        }
        let Ok(mut slot) = self.watcher.lock() else {
            return Ok(false);
        };
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(false);
        }

        let pipeline = Arc::clone(self);
        let interval = self.watch_interval;
        *slot = Some(tokio::spawn(async move {
            tracing::info!("Watcher | Started (every {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match pipeline.scan(ScanMode::Delta).await {
                    Ok(ScanOutcome::Completed(report)) if report.ingest.inserted > 0 => {
                        tracing::info!("Watcher | {} new assets", report.ingest.inserted)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Watcher | Delta scan failed: {}", e),
                }
            }
        }));
        Ok(true)
    }

    /// Stops the delta-scan loop. Returns false if it was not running.
    pub fn stop_watch(&self) -> bool {
        let handle = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        match handle {
            Some(h) if !h.is_finished() => {
                h.abort();
                tracing::info!("Watcher | Stopped");
                true
            }
            _ => false,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let store = self.db.ping().await.is_ok();
        let drive_auth = match &self.drive {
            Some(drive) => Some(drive.auth().has_valid_token().await),
            None => None,
        };
        let cached_folders = match &self.scanner {
            Some(scanner) => scanner.cached_folders().await,
            None => 0,
        };
        HealthReport {
            store,
            drive_auth,
            drip: self.drip.as_ref().map(|d| d.status().state),
            scanning: self.is_scanning(),
            watching: self.is_watching(),
            cached_folders,
        }
    }
}

pub fn enrich_counters(report: &EnrichReport) -> RunCounters {
    RunCounters {
        processed: report.tagged + report.errors,
        succeeded: report.tagged,
        failed: report.errors,
    }
}
