//! Batched classification of untagged assets.
//!
//! Batches of up to 25 assets are sent to the classifier on a fixed number
//! of lanes. Results land in a shared pending-writes buffer that a single
//! flusher at a time drains into the store.

pub mod classifier;
pub mod turbo;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use sea_orm::sea_query::Expr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entities::asset;
use crate::services::shopify::{CatalogError, ProductCatalog};
use crate::utils::concurrency::{bounded_pool, run_lanes};
use crate::utils::error_message;
use classifier::{Classification, Classifier, ClassifierError, ClassifyItem, ItemResult, CALL_TIMEOUT};

pub const BATCH_SIZE: usize = 25;
pub const DEFAULT_LANES: usize = 8;
const WRITE_SUB_BATCH: usize = 25;
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);
const WRITE_ATTEMPTS: u32 = 3;
const CLASSIFY_ATTEMPTS: u32 = 2;
const TAG_PUSH_PACE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
pub struct TagUpdate {
    pub item: ClassifyItem,
    pub classification: Classification,
}

#[async_trait]
pub trait EnrichmentStore: Send + Sync {
    /// Assets without a style, or every asset when `force` is set.
    async fn untagged(&self, force: bool, limit: Option<u64>) -> Result<Vec<ClassifyItem>, DbErr>;

    async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<ClassifyItem>, DbErr>;

    async fn write_tags(&self, update: &TagUpdate) -> Result<(), DbErr>;

    async fn record_errors(&self, ids: &[Uuid], message: &str) -> Result<(), DbErr>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichReport {
    pub batches: u64,
    pub tagged: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    pub force: bool,
    pub limit: Option<u64>,
}

#[derive(Default)]
struct PendingWrites {
    buffer: Mutex<Vec<TagUpdate>>,
    flushing: AtomicBool,
    pushes: Mutex<Vec<(String, Vec<String>)>>,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    tagged: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> EnrichReport {
        EnrichReport {
            batches: self.batches.load(Ordering::SeqCst),
            tagged: self.tagged.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }
}

pub struct EnrichmentWorker {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn EnrichmentStore>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    lanes: usize,
}

impl EnrichmentWorker {
    pub fn new(classifier: Arc<dyn Classifier>, store: Arc<dyn EnrichmentStore>) -> Self {
        Self {
            classifier,
            store,
            catalog: None,
            lanes: DEFAULT_LANES,
        }
    }

    /// Also push the computed tags to already-synced products.
    pub fn with_tag_push(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes.max(1);
        self
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn store(&self) -> &Arc<dyn EnrichmentStore> {
        &self.store
    }

    pub async fn run(&self, options: EnrichOptions) -> Result<EnrichReport, DbErr> {
        self.run_with_lanes(options, self.lanes).await
    }

    /// Like `run`, with a lane count other than the worker's own.
    pub async fn run_with_lanes(&self, options: EnrichOptions, lanes: usize) -> Result<EnrichReport, DbErr> {
        let items = self.store.untagged(options.force, options.limit).await?;
        tracing::info!("Enrichment | {} assets to classify across {} lanes", items.len(), lanes);
        Ok(self.enrich_in_lanes(items, lanes, |_| {}).await)
    }

    /// Classifies `items`, calling `on_progress` after every batch with the
    /// running totals.
    pub async fn enrich<P>(&self, items: Vec<ClassifyItem>, on_progress: P) -> EnrichReport
    where
        P: Fn(EnrichReport) + Send + Sync,
    {
        self.enrich_in_lanes(items, self.lanes, on_progress).await
    }

    async fn enrich_in_lanes<P>(&self, items: Vec<ClassifyItem>, lanes: usize, on_progress: P) -> EnrichReport
    where
        P: Fn(EnrichReport) + Send + Sync,
    {
        let batches: Vec<Vec<ClassifyItem>> = items.chunks(BATCH_SIZE).map(|c| c.to_vec()).collect();
        let total_batches = batches.len();
        let pending = PendingWrites::default();
        let counters = Counters::default();

        run_lanes(batches, lanes.max(1), |idx, batch| {
            let pending = &pending;
            let counters = &counters;
            let on_progress = &on_progress;
            async move {
                match self.classify_with_retry(&batch).await {
                    Ok(results) => {
                        let returned = results.len();
                        let mut updates = Vec::with_capacity(returned);
                        for (item, result) in batch.iter().cloned().zip(results) {
                            match result {
                                Ok(classification) => updates.push(TagUpdate { item, classification }),
                                Err(reason) => {
                                    counters.errors.fetch_add(1, Ordering::SeqCst);
                                    self.record_errors(&[item.id], &reason).await;
                                }
                            }
                        }
                        let missing: Vec<Uuid> = batch.iter().skip(returned).map(|i| i.id).collect();
                        if !missing.is_empty() {
                            counters.errors.fetch_add(missing.len() as u64, Ordering::SeqCst);
                            self.record_errors(&missing, "classifier returned no result for this item").await;
                        }
                        pending.buffer.lock().await.extend(updates);
                        self.flush(pending, counters).await;
                    }
                    Err(e) => {
                        tracing::error!("Enrichment | Batch {}/{} failed: {}", idx + 1, total_batches, e);
                        counters.errors.fetch_add(batch.len() as u64, Ordering::SeqCst);
                        let ids: Vec<Uuid> = batch.iter().map(|i| i.id).collect();
                        self.record_errors(&ids, &e.to_string()).await;
                    }
                }
                counters.batches.fetch_add(1, Ordering::SeqCst);
                on_progress(counters.snapshot());
            }
        })
        .await;

        // Every lane has returned, so no flusher can still hold the flag.
        self.flush(&pending, &counters).await;

        if let Some(catalog) = &self.catalog {
            let pushes = std::mem::take(&mut *pending.pushes.lock().await);
            push_tags(catalog.as_ref(), pushes).await;
        }

        let report = counters.snapshot();
        tracing::info!(
            "Enrichment | Done: {} batches, {} tagged, {} errors",
            report.batches,
            report.tagged,
            report.errors
        );
        report
    }

    async fn classify_with_retry(&self, batch: &[ClassifyItem]) -> Result<Vec<ItemResult>, ClassifierError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(CALL_TIMEOUT, self.classifier.classify(batch)).await {
                Ok(r) => r,
                Err(_) => Err(ClassifierError::Timeout(CALL_TIMEOUT)),
            };
            match result {
                Ok(c) => return Ok(c),
                Err(e) if attempt < CLASSIFY_ATTEMPTS => {
                    tracing::warn!("Enrichment | Classifier attempt {} failed: {}", attempt, e);
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_errors(&self, ids: &[Uuid], message: &str) {
        if let Err(e) = self.store.record_errors(ids, message).await {
            tracing::warn!("Enrichment | Could not record errors on {} assets: {}", ids.len(), e);
        }
    }

    /// Single-flight: returns at once if another lane is already flushing.
    async fn flush(&self, pending: &PendingWrites, counters: &Counters) {
        if pending.flushing.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let drained = std::mem::take(&mut *pending.buffer.lock().await);
            if drained.is_empty() {
                break;
            }
            for chunk in drained.chunks(WRITE_SUB_BATCH) {
                let results = bounded_pool(chunk.to_vec(), WRITE_SUB_BATCH, |update| async move {
                    let ok = self.write_with_retry(&update).await;
                    (update, ok)
                })
                .await;
                for (update, ok) in results {
                    if ok {
                        counters.tagged.fetch_add(1, Ordering::SeqCst);
                        if let Some(product_id) = update.item.shopify_product_id.clone() {
                            pending
                                .pushes
                                .lock()
                                .await
                                .push((product_id, update.classification.storefront_tags()));
                        }
                    } else {
                        counters.errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
        pending.flushing.store(false, Ordering::SeqCst);
    }

    async fn write_with_retry(&self, update: &TagUpdate) -> bool {
        for attempt in 1..=WRITE_ATTEMPTS {
            match tokio::time::timeout(WRITE_TIMEOUT, self.store.write_tags(update)).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => tracing::warn!(
                    "Enrichment | Write for {} failed (attempt {}): {}",
                    update.item.id,
                    attempt,
                    e
                ),
                Err(_) => tracing::warn!(
                    "Enrichment | Write for {} timed out (attempt {})",
                    update.item.id,
                    attempt
                ),
            }
            if attempt < WRITE_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(300 * attempt as u64)).await;
            }
        }
        false
    }
}

async fn push_tags(catalog: &dyn ProductCatalog, pushes: Vec<(String, Vec<String>)>) {
    if pushes.is_empty() {
        return;
    }
    tracing::info!("Enrichment | Pushing tags to {} products", pushes.len());
    for (product_id, tags) in pushes {
        for attempt in 0..3 {
            match catalog.update_tags(&product_id, &tags).await {
                Ok(_) => break,
                Err(CatalogError::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or(2) + 1;
                    tracing::warn!(
                        "Enrichment | Tag push rate limited (attempt {}), waiting {}s",
                        attempt + 1,
                        wait
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(e) => {
                    tracing::warn!("Enrichment | Tag push for product {} failed: {}", product_id, e);
                    break;
                }
            }
        }
        tokio::time::sleep(TAG_PUSH_PACE).await;
    }
}

fn to_item(model: asset::Model) -> ClassifyItem {
    ClassifyItem {
        id: model.id,
        title: model.title.unwrap_or(model.filename),
        artist: model.artist.unwrap_or_else(|| "Unknown".to_string()),
        shopify_product_id: model.shopify_product_id,
    }
}

pub struct DbEnrichmentStore {
    db: Arc<DatabaseConnection>,
}

impl DbEnrichmentStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EnrichmentStore for DbEnrichmentStore {
    async fn untagged(&self, force: bool, limit: Option<u64>) -> Result<Vec<ClassifyItem>, DbErr> {
        let mut query = asset::Entity::find()
            .filter(asset::Column::IngestionStatus.ne(asset::IngestionStatus::Error))
            .order_by_asc(asset::Column::CreatedAt);
        if !force {
            query = query.filter(asset::Column::Style.is_null());
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.all(self.db.as_ref()).await?.into_iter().map(to_item).collect())
    }

    async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<ClassifyItem>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = asset::Entity::find()
            .filter(asset::Column::Id.is_in(ids.iter().copied()))
            .order_by_asc(asset::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(to_item).collect())
    }

    async fn write_tags(&self, update: &TagUpdate) -> Result<(), DbErr> {
        let c = &update.classification;
        asset::ActiveModel {
            id: Set(update.item.id),
            style: Set(c.style.clone()),
            mood: Set(c.mood.clone()),
            subject: Set(c.subject.clone()),
            era: Set(c.era.clone()),
            palette: Set(c.palette.clone()),
            ai_tags: Set(c.ai_tags.clone()),
            ingestion_error: Set(None),
            ..Default::default()
        }
        .update(self.db.as_ref())
        .await
        .map(|_| ())
    }

    async fn record_errors(&self, ids: &[Uuid], message: &str) -> Result<(), DbErr> {
        if ids.is_empty() {
            return Ok(());
        }
        asset::Entity::update_many()
            .col_expr(asset::Column::IngestionError, Expr::value(error_message(message)))
            .filter(asset::Column::Id.is_in(ids.iter().copied()))
            .exec(self.db.as_ref())
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use super::classifier::parse_classifications;
    use crate::services::shopify::{CallLimit, CreatedProduct, ProductInput};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    pub(crate) fn items(n: usize) -> Vec<ClassifyItem> {
        (0..n)
            .map(|i| ClassifyItem {
                id: Uuid::from_u128(i as u128 + 1),
                title: format!("Work {i}"),
                artist: "Artist".into(),
                shopify_product_id: (i % 2 == 0).then(|| format!("{}", 1000 + i)),
            })
            .collect()
    }

    struct EchoClassifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Classifier for EchoClassifier {
        async fn classify(&self, items: &[ClassifyItem]) -> Result<Vec<ItemResult>, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClassifierError::Malformed("nope".into()));
            }
            Ok(items
                .iter()
                .map(|i| {
                    Ok(Classification {
                        style: Some("Realism".into()),
                        ai_tags: vec![i.title.to_lowercase()],
                        ..Default::default()
                    })
                })
                .collect())
        }
    }

    /// Answers every batch with the same raw completion.
    struct CannedClassifier(&'static str);

    #[async_trait]
    impl Classifier for CannedClassifier {
        async fn classify(&self, _items: &[ClassifyItem]) -> Result<Vec<ItemResult>, ClassifierError> {
            parse_classifications(self.0)
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub written: StdMutex<HashMap<Uuid, Classification>>,
        pub errors: StdMutex<Vec<Uuid>>,
        pub flaky_writes: AtomicUsize,
    }

    #[async_trait]
    impl EnrichmentStore for MemoryStore {
        async fn untagged(&self, _force: bool, limit: Option<u64>) -> Result<Vec<ClassifyItem>, DbErr> {
            Ok(items(limit.unwrap_or(10) as usize))
        }

        async fn by_ids(&self, ids: &[Uuid]) -> Result<Vec<ClassifyItem>, DbErr> {
            Ok(items(100).into_iter().filter(|i| ids.contains(&i.id)).collect())
        }

        async fn write_tags(&self, update: &TagUpdate) -> Result<(), DbErr> {
            if self
                .flaky_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DbErr::Custom("connection reset".into()));
            }
            self.written
                .lock()
                .unwrap()
                .insert(update.item.id, update.classification.clone());
            Ok(())
        }

        async fn record_errors(&self, ids: &[Uuid], _message: &str) -> Result<(), DbErr> {
            self.errors.lock().unwrap().extend_from_slice(ids);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingCatalog {
        tagged: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ProductCatalog for RecordingCatalog {
        async fn create_product(&self, _product: &ProductInput) -> Result<CreatedProduct, CatalogError> {
            unreachable!("enrichment never creates products")
        }

        async fn update_tags(&self, product_id: &str, _tags: &[String]) -> Result<Option<CallLimit>, CatalogError> {
            self.tagged.lock().unwrap().push(product_id.to_string());
            Ok(None)
        }
    }

    fn worker(fail: bool, store: Arc<MemoryStore>) -> (EnrichmentWorker, Arc<EchoClassifier>) {
        let classifier = Arc::new(EchoClassifier { calls: AtomicUsize::new(0), fail });
        (EnrichmentWorker::new(classifier.clone(), store), classifier)
    }

    #[tokio::test]
    async fn every_item_is_written_once() {
        let store = Arc::new(MemoryStore::default());
        let (worker, classifier) = worker(false, Arc::clone(&store));
        let progress = StdMutex::new(Vec::new());

        let report = worker
            .enrich(items(60), |r| progress.lock().unwrap().push(r.batches))
            .await;

        assert_eq!(report, EnrichReport { batches: 3, tagged: 60, errors: 0 });
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.written.lock().unwrap().len(), 60);
        let mut seen = progress.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_batches_are_retried_then_counted() {
        let store = Arc::new(MemoryStore::default());
        let (worker, classifier) = worker(true, Arc::clone(&store));

        let report = worker.enrich(items(30), |_| {}).await;

        assert_eq!(report.tagged, 0);
        assert_eq!(report.errors, 30);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.errors.lock().unwrap().len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_write_failures_are_retried() {
        let store = Arc::new(MemoryStore {
            flaky_writes: AtomicUsize::new(2),
            ..Default::default()
        });
        let (worker, _) = worker(false, Arc::clone(&store));

        let report = worker.enrich(items(5), |_| {}).await;

        assert_eq!(report.tagged, 5);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tags_are_pushed_for_synced_products() {
        let store = Arc::new(MemoryStore::default());
        let catalog = Arc::new(RecordingCatalog::default());
        let (worker, _) = worker(false, Arc::clone(&store));
        let worker = worker.with_tag_push(catalog.clone());

        worker.enrich(items(4), |_| {}).await;

        let mut pushed = catalog.tagged.lock().unwrap().clone();
        pushed.sort();
        assert_eq!(pushed, vec!["1000", "1002"]);
    }

    #[tokio::test]
    async fn unusable_answers_are_errors_not_tags() {
        let store = Arc::new(MemoryStore::default());
        let classifier = Arc::new(CannedClassifier(r#"[{"style":"Realism","ai_tags":["night"]}, "garbage"]"#));
        let worker = EnrichmentWorker::new(classifier, store.clone());

        let report = worker.enrich(items(2), |_| {}).await;

        assert_eq!(report, EnrichReport { batches: 1, tagged: 1, errors: 1 });
        let written = store.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert!(written.contains_key(&Uuid::from_u128(1)));
        assert_eq!(*store.errors.lock().unwrap(), vec![Uuid::from_u128(2)]);
    }
}
