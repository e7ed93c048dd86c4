//! Text descriptors, embedding generation and the vector index.

pub mod client;
pub mod search;

pub use client::{Embedder, EmbedError, GeminiEmbedder, DIMENSIONS};

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    Statement,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::entities::asset;
use crate::utils::truncate_chars;

pub const CHUNK_SIZE: usize = 100;
const DESCRIPTOR_MAX_CHARS: usize = 1000;
const CHUNK_PACE: Duration = Duration::from_millis(200);
const QUOTA_WAIT: Duration = Duration::from_secs(60);
const QUOTA_RETRIES: u32 = 5;

/// The text an asset is embedded from.
pub fn descriptor(asset: &asset::Model) -> String {
    let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let mut parts: Vec<String> = Vec::new();
    parts.extend(present(&asset.title));
    parts.extend(present(&asset.artist).map(|a| format!("by {a}")));
    parts.extend(present(&asset.style));
    parts.extend(present(&asset.era));
    parts.extend(present(&asset.mood));
    parts.extend(present(&asset.palette).map(|p| format!("{p} palette")));
    parts.extend(present(&asset.subject));
    parts.extend(present(&asset.ratio_class).map(|r| r.replace('_', " ")));
    parts.extend(present(&asset.description));
    if !asset.ai_tags.is_empty() {
        parts.push(asset.ai_tags.join(", "));
    }

    truncate_chars(&parts.join(". "), DESCRIPTOR_MAX_CHARS)
}

/// pgvector's text form: `[0.1,0.2,...]`.
pub fn vector_literal(values: &[f32]) -> String {
    let inner: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", inner.join(","))
}

pub fn parse_vector(raw: &str) -> Option<Vec<f32>> {
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner.split(',').map(|v| v.trim().parse().ok()).collect()
}

/// A row returned by the `match_assets` function.
#[derive(Debug, Clone, PartialEq, FromQueryResult, Serialize)]
pub struct MatchRow {
    pub asset_id: Uuid,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub style: Option<String>,
    pub drive_file_id: Option<String>,
    pub shopify_product_id: Option<String>,
    pub similarity: f64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Enriched assets that have no embedding yet.
    async fn missing(&self, limit: Option<u64>) -> Result<Vec<asset::Model>, DbErr>;

    async fn upsert(&self, asset_id: Uuid, vector: &[f32], text: &str) -> Result<(), DbErr>;

    async fn vector_for(&self, asset_id: Uuid) -> Result<Option<Vec<f32>>, DbErr>;

    async fn match_assets(&self, query: &[f32], threshold: f64, k: u64) -> Result<Vec<MatchRow>, DbErr>;
}

#[derive(FromQueryResult)]
struct EmbeddingText {
    embedding: String,
}

pub struct PgVectorStore {
    db: Arc<DatabaseConnection>,
}

impl PgVectorStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn missing(&self, limit: Option<u64>) -> Result<Vec<asset::Model>, DbErr> {
        let limit = limit.map(|l| l.min(i64::MAX as u64) as i64).unwrap_or(i64::MAX);
        asset::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"SELECT a.* FROM assets a
                   LEFT JOIN asset_embeddings e ON e.asset_id = a.id
                   WHERE e.asset_id IS NULL AND a.style IS NOT NULL
                   ORDER BY a.created_at
                   LIMIT $1"#,
                [limit.into()],
            ))
            .all(self.db.as_ref())
            .await
    }

    async fn upsert(&self, asset_id: Uuid, vector: &[f32], text: &str) -> Result<(), DbErr> {
        self.db
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"INSERT INTO asset_embeddings (asset_id, embedding, embedding_text)
                   VALUES ($1, $2::vector, $3)
                   ON CONFLICT (asset_id) DO UPDATE
                   SET embedding = EXCLUDED.embedding, embedding_text = EXCLUDED.embedding_text"#,
                [asset_id.into(), vector_literal(vector).into(), text.into()],
            ))
            .await
            .map(|_| ())
    }

    async fn vector_for(&self, asset_id: Uuid) -> Result<Option<Vec<f32>>, DbErr> {
        let row = EmbeddingText::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT embedding::text AS embedding FROM asset_embeddings WHERE asset_id = $1",
            [asset_id.into()],
        ))
        .one(self.db.as_ref())
        .await?;
        Ok(row.and_then(|r| parse_vector(&r.embedding)))
    }

    async fn match_assets(&self, query: &[f32], threshold: f64, k: u64) -> Result<Vec<MatchRow>, DbErr> {
        MatchRow::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT * FROM match_assets($1::vector, $2, $3)",
            [
                vector_literal(query).into(),
                threshold.into(),
                (k.min(i32::MAX as u64) as i32).into(),
            ],
        ))
        .all(self.db.as_ref())
        .await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub embedded: u64,
    pub errors: u64,
}

pub struct EmbeddingWorker {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl EmbeddingWorker {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut waits = 0;
        loop {
            match self.embedder.embed_batch(texts).await {
                Err(EmbedError::RateLimited) if waits < QUOTA_RETRIES => {
                    waits += 1;
                    tracing::warn!("Embeddings | Quota hit, waiting {:?} before retrying the chunk", QUOTA_WAIT);
                    tokio::time::sleep(QUOTA_WAIT).await;
                }
                other => return other,
            }
        }
    }

    pub async fn run(&self, limit: Option<u64>) -> Result<EmbedReport, DbErr> {
        let assets = self.store.missing(limit).await?;
        tracing::info!("Embeddings | {} assets to embed", assets.len());
        let mut report = EmbedReport::default();

        for (i, chunk) in assets.chunks(CHUNK_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(CHUNK_PACE).await;
            }
            let texts: Vec<String> = chunk.iter().map(descriptor).collect();
            let vectors = match self.embed_chunk(&texts).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!("Embeddings | Chunk {} failed: {}", i + 1, e);
                    report.errors += chunk.len() as u64;
                    continue;
                }
            };

            for ((asset, text), vector) in chunk.iter().zip(&texts).zip(&vectors) {
                match self.store.upsert(asset.id, vector, text).await {
                    Ok(()) => report.embedded += 1,
                    Err(e) => {
                        report.errors += 1;
                        tracing::error!("Embeddings | Upsert for {} failed: {}", asset.id, e);
                    }
                }
            }
        }

        tracing::info!("Embeddings | Done: {} embedded, {} errors", report.embedded, report.errors);
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::entities::asset::{IngestionStatus, ShopifyStatus};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) fn sample_asset(n: u128) -> asset::Model {
        let now = chrono::Utc::now().naive_utc();
        asset::Model {
            id: Uuid::from_u128(n),
            drive_file_id: Some(format!("drive-{n}")),
            filename: format!("Work {n}_4000x3000.jpg"),
            path: None,
            mime_type: Some("image/jpeg".into()),
            size_bytes: None,
            md5_checksum: None,
            width_px: Some(4000),
            height_px: Some(3000),
            aspect_ratio: Some(4000.0 / 3000.0),
            ratio_class: Some("landscape_4_3".into()),
            max_print_width_cm: Some(112.9),
            max_print_height_cm: Some(84.67),
            quality_tier: None,
            artist: Some("Claude Monet".into()),
            title: Some(format!("Work {n}")),
            description: None,
            style: Some("Impressionism".into()),
            mood: Some("Serene".into()),
            subject: Some("Landscape".into()),
            era: Some("19th Century".into()),
            palette: Some("Cool".into()),
            ai_tags: vec!["water".into(), "garden".into()],
            ingestion_status: IngestionStatus::Analyzed,
            shopify_status: ShopifyStatus::Synced,
            ingestion_error: None,
            shopify_product_id: Some(format!("{}", 9000 + n)),
            shopify_product_gid: None,
            shopify_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn descriptor_field_order() {
        let text = descriptor(&sample_asset(1));
        assert_eq!(
            text,
            "Work 1. by Claude Monet. Impressionism. 19th Century. Serene. Cool palette. \
             Landscape. landscape 4 3. water, garden"
        );
    }

    #[test]
    fn descriptor_is_capped() {
        let mut a = sample_asset(1);
        a.description = Some("x".repeat(5000));
        assert_eq!(descriptor(&a).chars().count(), 1000);
    }

    #[test]
    fn vector_text_round_trip() {
        let literal = vector_literal(&[0.5, -1.0, 2.25]);
        assert_eq!(literal, "[0.5,-1,2.25]");
        assert_eq!(parse_vector(&literal), Some(vec![0.5, -1.0, 2.25]));
        assert_eq!(parse_vector("nope"), None);
    }

    #[derive(Default)]
    pub(crate) struct MemoryVectors {
        pub assets: Vec<asset::Model>,
        pub stored: Mutex<HashMap<Uuid, (Vec<f32>, String)>>,
    }

    #[async_trait]
    impl VectorStore for MemoryVectors {
        async fn missing(&self, limit: Option<u64>) -> Result<Vec<asset::Model>, DbErr> {
            let stored = self.stored.lock().unwrap();
            Ok(self
                .assets
                .iter()
                .filter(|a| !stored.contains_key(&a.id))
                .take(limit.unwrap_or(u64::MAX) as usize)
                .cloned()
                .collect())
        }

        async fn upsert(&self, asset_id: Uuid, vector: &[f32], text: &str) -> Result<(), DbErr> {
            self.stored
                .lock()
                .unwrap()
                .insert(asset_id, (vector.to_vec(), text.to_string()));
            Ok(())
        }

        async fn vector_for(&self, asset_id: Uuid) -> Result<Option<Vec<f32>>, DbErr> {
            Ok(self.stored.lock().unwrap().get(&asset_id).map(|(v, _)| v.clone()))
        }

        async fn match_assets(&self, query: &[f32], threshold: f64, k: u64) -> Result<Vec<MatchRow>, DbErr> {
            let stored = self.stored.lock().unwrap();
            let mut rows: Vec<MatchRow> = self
                .assets
                .iter()
                .filter_map(|a| {
                    let (v, _) = stored.get(&a.id)?;
                    let similarity = if v.as_slice() == query { 1.0 } else { 0.6 };
                    (similarity > threshold).then(|| MatchRow {
                        asset_id: a.id,
                        title: a.title.clone(),
                        artist: a.artist.clone(),
                        style: a.style.clone(),
                        drive_file_id: a.drive_file_id.clone(),
                        shopify_product_id: a.shopify_product_id.clone(),
                        similarity,
                    })
                })
                .collect();
            rows.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
            rows.truncate(k as usize);
            Ok(rows)
        }
    }

    pub(crate) struct CountingEmbedder {
        pub calls: AtomicUsize,
        pub quota_failures: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .quota_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbedError::RateLimited);
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32; 4]).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quota_hits_wait_and_retry_the_chunk() {
        let store = Arc::new(MemoryVectors {
            assets: (1..=150).map(sample_asset).collect(),
            ..Default::default()
        });
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            quota_failures: AtomicUsize::new(1),
        });
        let worker = EmbeddingWorker::new(embedder.clone(), store.clone());

        let started = tokio::time::Instant::now();
        let report = worker.run(None).await.unwrap();

        assert_eq!(report, EmbedReport { embedded: 150, errors: 0 });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= QUOTA_WAIT);
        let stored = store.stored.lock().unwrap();
        let (_, text) = stored.get(&Uuid::from_u128(7)).unwrap();
        assert_eq!(text, &descriptor(&sample_asset(7)));
    }
}
