//! Auto-sync worker: pushes finished assets to the storefront catalog at
//! roughly one product per second, sleeping through the daily quota.

pub mod bucket;
pub mod payload;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::asset::{self, IngestionStatus, ShopifyStatus};
use crate::entities::asset_variant;
use crate::services::shopify::{CatalogError, CreatedProduct, ProductCatalog};
use crate::utils::error_message;
use crate::utils::retry::Transient;
use bucket::{throttle_sleep_ms, LeakyBucket};
use payload::product_payload;

pub const BATCH_SIZE: u64 = 50;
pub const PROGRESS_EVERY: u64 = 100;
pub const NETWORK_ATTEMPTS: u32 = 5;
pub const ERROR_ABORT_THRESHOLD: u64 = 500;
pub const PAUSE_POLL: Duration = Duration::from_secs(30);
pub const EXHAUSTED_SLEEP: Duration = Duration::from_secs(3600);
pub const SUPERVISOR_BACKOFF: Duration = Duration::from_secs(10);
/// Writes kept in reserve below the bucket's capacity.
const IN_FLIGHT: u32 = 1;

#[derive(Debug, Error)]
pub enum DripError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("aborted after {errors} errors against {synced} synced")]
    Aborted { errors: u64, synced: u64 },
    #[error("drip worker is not running")]
    Closed,
}

/// An asset waiting for its product, with its stored print sizes.
#[derive(Debug, Clone)]
pub struct PendingProduct {
    pub asset: asset::Model,
    pub variants: Vec<asset_variant::Model>,
}

#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Unsynced assets not marked as errors, ordered by id.
    async fn next_batch(&self, limit: u64) -> Result<Vec<PendingProduct>, DbErr>;
    /// Assets without a product id, errors included.
    async fn remaining(&self) -> Result<u64, DbErr>;
    async fn mark_synced(&self, asset_id: Uuid, product: &CreatedProduct) -> Result<(), DbErr>;
    async fn mark_error(&self, asset_id: Uuid, message: &str) -> Result<(), DbErr>;
}

pub struct DbSyncQueue {
    db: Arc<DatabaseConnection>,
}

impl DbSyncQueue {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncQueue for DbSyncQueue {
    async fn next_batch(&self, limit: u64) -> Result<Vec<PendingProduct>, DbErr> {
        let assets = asset::Entity::find()
            .filter(asset::Column::ShopifyProductId.is_null())
            .filter(asset::Column::ShopifyStatus.ne(ShopifyStatus::Error))
            .order_by_asc(asset::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        if assets.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = assets.iter().map(|a| a.id).collect();
        let mut by_asset: HashMap<Uuid, Vec<asset_variant::Model>> = HashMap::new();
        for variant in asset_variant::Entity::find()
            .filter(asset_variant::Column::AssetId.is_in(ids))
            .order_by_asc(asset_variant::Column::SortOrder)
            .all(self.db.as_ref())
            .await?
        {
            by_asset.entry(variant.asset_id).or_default().push(variant);
        }

        Ok(assets
            .into_iter()
            .map(|asset| PendingProduct {
                variants: by_asset.remove(&asset.id).unwrap_or_default(),
                asset,
            })
            .collect())
    }

    async fn remaining(&self) -> Result<u64, DbErr> {
        asset::Entity::find()
            .filter(asset::Column::ShopifyProductId.is_null())
            .count(self.db.as_ref())
            .await
    }

    async fn mark_synced(&self, asset_id: Uuid, product: &CreatedProduct) -> Result<(), DbErr> {
        let now = Utc::now().naive_utc();
        // The product id is written once; a second writer finds no row.
        let res = asset::Entity::update_many()
            .col_expr(asset::Column::ShopifyStatus, Expr::value(ShopifyStatus::Synced))
            .col_expr(asset::Column::IngestionStatus, Expr::value(IngestionStatus::Ready))
            .col_expr(asset::Column::ShopifyProductId, Expr::value(product.id.clone()))
            .col_expr(asset::Column::ShopifyProductGid, Expr::value(product.gid.clone()))
            .col_expr(asset::Column::ShopifySyncedAt, Expr::value(now))
            .col_expr(asset::Column::UpdatedAt, Expr::value(now))
            .filter(asset::Column::Id.eq(asset_id))
            .filter(asset::Column::ShopifyProductId.is_null())
            .exec(self.db.as_ref())
            .await?;
        if res.rows_affected == 0 {
            tracing::warn!("Drip | Asset {} already carried a product id", asset_id);
        }
        Ok(())
    }

    async fn mark_error(&self, asset_id: Uuid, message: &str) -> Result<(), DbErr> {
        asset::Entity::update_many()
            .col_expr(asset::Column::ShopifyStatus, Expr::value(ShopifyStatus::Error))
            .col_expr(asset::Column::IngestionError, Expr::value(error_message(message)))
            .col_expr(asset::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
            .filter(asset::Column::Id.eq(asset_id))
            .filter(asset::Column::ShopifyProductId.is_null())
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum DripCommand {
    /// `cap` bounds the number of variants created in this session.
    Start { cap: Option<u64> },
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DripState {
    Stopped,
    Running,
    Paused,
    Sleeping,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DripStatus {
    pub state: DripState,
    pub synced: u64,
    pub errors: u64,
    pub variants_created: u64,
    pub remaining: Option<u64>,
    pub cap: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub sleeping_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Sessions finished since the process started.
    pub completed_runs: u64,
}

impl Default for DripStatus {
    fn default() -> Self {
        Self {
            state: DripState::Stopped,
            synced: 0,
            errors: 0,
            variants_created: 0,
            remaining: None,
            cap: None,
            started_at: None,
            sleeping_until: None,
            last_error: None,
            completed_runs: 0,
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct DripWorker {
    queue: Arc<dyn SyncQueue>,
    catalog: Arc<dyn ProductCatalog>,
    image_base: String,
    clock: Clock,
}

impl DripWorker {
    pub fn new(queue: Arc<dyn SyncQueue>, catalog: Arc<dyn ProductCatalog>, image_base: impl Into<String>) -> Self {
        Self {
            queue,
            catalog,
            image_base: image_base.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Wall clock used for the midnight computation.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// Cloneable control surface for the spawned worker.
#[derive(Clone)]
pub struct DripHandle {
    tx: mpsc::Sender<DripCommand>,
    status: watch::Receiver<DripStatus>,
}

impl DripHandle {
    pub fn spawn(worker: DripWorker) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let (status_tx, status) = watch::channel(DripStatus::default());
        let actor = DripActor {
            worker,
            rx,
            status: status_tx,
            bucket: LeakyBucket::new(),
        };
        tokio::spawn(actor.run());
        Self { tx, status }
    }

    pub async fn send(&self, command: DripCommand) -> Result<(), DripError> {
        self.tx.send(command).await.map_err(|_| DripError::Closed)
    }

    pub fn status(&self) -> DripStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DripStatus> {
        self.status.clone()
    }

    /// Starts a session and waits for it to end.
    pub async fn run_once(&self, cap: Option<u64>) -> Result<DripStatus, DripError> {
        let mut rx = self.status.clone();
        let before = rx.borrow().completed_runs;
        self.send(DripCommand::Start { cap }).await?;
        let status = rx
            .wait_for(|s| s.completed_runs > before)
            .await
            .map_err(|_| DripError::Closed)?
            .clone();
        Ok(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

enum ItemOutcome {
    Synced { variants: u64 },
    Failed,
    /// Left unmarked after a second rate limit; picked up again later.
    Skipped,
    Throttled,
    Stopped,
}

enum SessionEnd {
    Stopped,
    AllDone,
    CapReached,
}

struct DripActor {
    worker: DripWorker,
    rx: mpsc::Receiver<DripCommand>,
    status: watch::Sender<DripStatus>,
    bucket: LeakyBucket,
}

impl DripActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                DripCommand::Start { cap } => self.supervise(cap).await,
                other => tracing::debug!("Drip | Ignoring {:?} while stopped", other),
            }
        }
        tracing::info!("Drip | Control channel closed");
    }

    fn set_state(&self, state: DripState) {
        self.status.send_modify(|s| {
            s.state = state;
            if state != DripState::Sleeping {
                s.sleeping_until = None;
            }
        });
    }

    fn state(&self) -> DripState {
        self.status.borrow().state
    }

    async fn supervise(&mut self, cap: Option<u64>) {
        let now = (self.worker.clock)();
        self.status.send_modify(|s| {
            s.state = DripState::Running;
            s.synced = 0;
            s.errors = 0;
            s.variants_created = 0;
            s.cap = cap;
            s.started_at = Some(now);
            s.sleeping_until = None;
            s.last_error = None;
        });
        tracing::info!("Drip | Started (cap: {:?})", cap);

        loop {
            match self.session(cap).await {
                Ok(end) => {
                    match end {
                        SessionEnd::AllDone => tracing::info!("Drip | Every asset is synced"),
                        SessionEnd::CapReached => tracing::info!("Drip | Variant cap reached"),
                        SessionEnd::Stopped => tracing::info!("Drip | Stopped"),
                    }
                    break;
                }
                Err(e @ DripError::Aborted { .. }) => {
                    tracing::error!("Drip | {}", e);
                    self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                    break;
                }
                Err(e) => {
                    tracing::error!("Drip | Loop error: {} | restarting in {:?}", e, SUPERVISOR_BACKOFF);
                    self.status.send_modify(|s| s.last_error = Some(error_message(&e.to_string())));
                    if self.sleep_until(Instant::now() + SUPERVISOR_BACKOFF).await == Flow::Stop {
                        break;
                    }
                }
            }
        }

        self.status.send_modify(|s| {
            s.state = DripState::Stopped;
            s.sleeping_until = None;
            s.completed_runs += 1;
        });
    }

    async fn session(&mut self, cap: Option<u64>) -> Result<SessionEnd, DripError> {
        let queue = self.worker.queue.clone();
        loop {
            if self.checkpoint().await == Flow::Stop {
                return Ok(SessionEnd::Stopped);
            }

            let batch = queue.next_batch(BATCH_SIZE).await?;
            if batch.is_empty() {
                let remaining = queue.remaining().await?;
                self.status.send_modify(|s| s.remaining = Some(remaining));
                if remaining == 0 {
                    return Ok(SessionEnd::AllDone);
                }
                tracing::info!(
                    "Drip | {} assets left, all marked as errors | sleeping {:?}",
                    remaining,
                    EXHAUSTED_SLEEP
                );
                if self.sleep_until(Instant::now() + EXHAUSTED_SLEEP).await == Flow::Stop {
                    return Ok(SessionEnd::Stopped);
                }
                continue;
            }

            for item in batch {
                if self.checkpoint().await == Flow::Stop {
                    return Ok(SessionEnd::Stopped);
                }
                if let Some(cap) = cap {
                    let needed = item.variants.len() as u64;
                    if self.status.borrow().variants_created + needed > cap {
                        return Ok(SessionEnd::CapReached);
                    }
                }

                loop {
                    match self.sync_one(&item).await? {
                        ItemOutcome::Synced { variants } => {
                            self.status.send_modify(|s| {
                                s.synced += 1;
                                s.variants_created += variants;
                            });
                            let synced = self.status.borrow().synced;
                            if synced % PROGRESS_EVERY == 0 {
                                self.report_progress().await?;
                            }
                        }
                        ItemOutcome::Failed | ItemOutcome::Skipped => {
                            self.status.send_modify(|s| s.errors += 1);
                        }
                        ItemOutcome::Throttled => {
                            if self.sleep_to_midnight().await == Flow::Stop {
                                return Ok(SessionEnd::Stopped);
                            }
                            continue;
                        }
                        ItemOutcome::Stopped => return Ok(SessionEnd::Stopped),
                    }
                    break;
                }

                let (errors, synced) = {
                    let s = self.status.borrow();
                    (s.errors, s.synced)
                };
                if errors > ERROR_ABORT_THRESHOLD && errors > synced {
                    return Err(DripError::Aborted { errors, synced });
                }
            }
        }
    }

    async fn report_progress(&self) -> Result<(), DripError> {
        let remaining = self.worker.queue.remaining().await?;
        self.status.send_modify(|s| s.remaining = Some(remaining));
        let s = self.status.borrow();
        tracing::info!(
            "Drip | Progress: {} synced, {} errors, {} remaining",
            s.synced,
            s.errors,
            remaining
        );
        Ok(())
    }

    async fn sync_one(&mut self, item: &PendingProduct) -> Result<ItemOutcome, DripError> {
        let asset_id = item.asset.id;
        let Some(product) = product_payload(&item.asset, &item.variants, &self.worker.image_base) else {
            self.worker
                .queue
                .mark_error(asset_id, "No sellable variants or source file")
                .await?;
            return Ok(ItemOutcome::Failed);
        };

        let catalog = self.worker.catalog.clone();
        let mut rate_limit_retried = false;
        let mut network_attempt = 0u32;
        loop {
            self.bucket.acquire(IN_FLIGHT).await;
            match catalog.create_product(&product).await {
                Ok(created) => {
                    if let Some(limit) = created.call_limit {
                        self.bucket.observe(limit);
                    }
                    self.worker.queue.mark_synced(asset_id, &created).await?;
                    tracing::debug!("Drip | Asset {} -> product {}", asset_id, created.id);
                    return Ok(ItemOutcome::Synced {
                        variants: product.variants.len() as u64,
                    });
                }
                Err(CatalogError::Throttled) => return Ok(ItemOutcome::Throttled),
                Err(CatalogError::RateLimited { retry_after }) => {
                    if rate_limit_retried {
                        tracing::warn!("Drip | Asset {} rate limited twice, skipping", asset_id);
                        return Ok(ItemOutcome::Skipped);
                    }
                    rate_limit_retried = true;
                    let wait = Duration::from_secs(retry_after.unwrap_or(1) + 1);
                    tracing::warn!("Drip | Rate limited, retrying in {:?}", wait);
                    if self.sleep_until(Instant::now() + wait).await == Flow::Stop {
                        return Ok(ItemOutcome::Stopped);
                    }
                }
                Err(e) if e.is_transient() && network_attempt + 1 < NETWORK_ATTEMPTS => {
                    network_attempt += 1;
                    let wait = Duration::from_secs(2 * network_attempt as u64);
                    tracing::warn!(
                        "Drip | Network error on asset {} (attempt {}/{}): {} | retrying in {:?}",
                        asset_id,
                        network_attempt,
                        NETWORK_ATTEMPTS,
                        e,
                        wait
                    );
                    if self.sleep_until(Instant::now() + wait).await == Flow::Stop {
                        return Ok(ItemOutcome::Stopped);
                    }
                }
                Err(e) => {
                    tracing::warn!("Drip | Asset {} failed: {}", asset_id, e);
                    self.worker.queue.mark_error(asset_id, &e.to_string()).await?;
                    return Ok(ItemOutcome::Failed);
                }
            }
        }
    }

    async fn sleep_to_midnight(&mut self) -> Flow {
        let now = (self.worker.clock)();
        let ms = throttle_sleep_ms(now);
        let wake = now + ChronoDuration::milliseconds(ms as i64);
        tracing::warn!("Drip | Daily variant limit hit, sleeping until {} ({} ms)", wake, ms);
        self.status.send_modify(|s| {
            s.state = DripState::Sleeping;
            s.sleeping_until = Some(wake);
        });
        let flow = self.sleep_until(Instant::now() + Duration::from_millis(ms)).await;
        if flow == Flow::Continue {
            tracing::info!("Drip | Quota window reset, resuming");
            self.set_state(DripState::Running);
        }
        flow
    }

    /// Drains queued commands without blocking, holding here while paused.
    async fn checkpoint(&mut self) -> Flow {
        loop {
            match self.rx.try_recv() {
                Ok(DripCommand::Stop) => return Flow::Stop,
                Ok(DripCommand::Pause) => {
                    if self.hold_paused().await == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Ok(_) => {}
                Err(mpsc::error::TryRecvError::Empty) => return Flow::Continue,
                Err(mpsc::error::TryRecvError::Disconnected) => return Flow::Stop,
            }
        }
    }

    /// Sleeps to `deadline` while still answering commands. A pause in the
    /// middle keeps the original deadline.
    async fn sleep_until(&mut self, deadline: Instant) -> Flow {
        loop {
            let command = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Flow::Continue,
                command = self.rx.recv() => command,
            };
            match command {
                None | Some(DripCommand::Stop) => return Flow::Stop,
                Some(DripCommand::Pause) => {
                    if self.hold_paused().await == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Some(_) => {}
            }
        }
    }

    async fn hold_paused(&mut self) -> Flow {
        let resume_to = self.state();
        self.set_state(DripState::Paused);
        tracing::info!("Drip | Paused");
        loop {
            match tokio::time::timeout(PAUSE_POLL, self.rx.recv()).await {
                Err(_) => tracing::debug!("Drip | Still paused"),
                Ok(None) | Ok(Some(DripCommand::Stop)) => return Flow::Stop,
                Ok(Some(DripCommand::Resume | DripCommand::Start { .. })) => {
                    tracing::info!("Drip | Resumed");
                    self.set_state(resume_to);
                    return Flow::Continue;
                }
                Ok(Some(DripCommand::Pause)) => {}
            }
        }
    }
}
