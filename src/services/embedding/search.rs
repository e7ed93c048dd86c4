//! Similar-asset and free-text search as interchangeable strategies.
//!
//! [`VectorSearch`] answers from the embedding index; [`TagSearch`] scores
//! shared enrichment tags. [`Fallback`] tries one and drops to the other
//! when the first is unavailable or finds nothing.

use async_trait::async_trait;
use sea_orm::sea_query::{Condition, Expr, Func};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::{EmbedError, Embedder, VectorStore};
use crate::entities::asset::{self, IngestionStatus};

pub const SIMILAR_THRESHOLD: f64 = 0.5;
pub const TEXT_THRESHOLD: f64 = 0.3;
const TAG_CANDIDATES: u64 = 300;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("{0}")]
    Unavailable(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub asset_id: Uuid,
    /// Cosine similarity for vector hits, tag score for tag hits.
    pub score: f64,
}

#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn similar(&self, source: &asset::Model, k: u64) -> Result<Vec<SearchHit>, SearchError>;

    async fn text(&self, query: &str, k: u64) -> Result<Vec<SearchHit>, SearchError>;
}

pub struct VectorSearch {
    store: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl VectorSearch {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl SearchStrategy for VectorSearch {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn similar(&self, source: &asset::Model, k: u64) -> Result<Vec<SearchHit>, SearchError> {
        let vector = self
            .store
            .vector_for(source.id)
            .await?
            .ok_or(SearchError::Unavailable("source asset has no embedding"))?;
        let rows = self.store.match_assets(&vector, SIMILAR_THRESHOLD, k + 1).await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.asset_id != source.id)
            .take(k as usize)
            .map(|r| SearchHit { asset_id: r.asset_id, score: r.similarity })
            .collect())
    }

    async fn text(&self, query: &str, k: u64) -> Result<Vec<SearchHit>, SearchError> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or(SearchError::Unavailable("no embedding service configured"))?;
        let vector = embedder.embed(query).await?;
        let rows = self.store.match_assets(&vector, TEXT_THRESHOLD, k).await?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit { asset_id: r.asset_id, score: r.similarity })
            .collect())
    }
}

fn same(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
}

/// +3 style, +2 mood, +2 subject, +1 palette, +1 ratio class, +1 for a
/// different artist.
pub fn tag_score(source: &asset::Model, candidate: &asset::Model) -> i32 {
    let mut score = 0;
    if same(&source.style, &candidate.style) {
        score += 3;
    }
    if same(&source.mood, &candidate.mood) {
        score += 2;
    }
    if same(&source.subject, &candidate.subject) {
        score += 2;
    }
    if same(&source.palette, &candidate.palette) {
        score += 1;
    }
    if same(&source.ratio_class, &candidate.ratio_class) {
        score += 1;
    }
    if !same(&source.artist, &candidate.artist) {
        score += 1;
    }
    score
}

/// Ranks candidates by [`tag_score`], best first; ties keep input order.
pub fn rank_by_tags(source: &asset::Model, candidates: Vec<asset::Model>, k: u64) -> Vec<SearchHit> {
    let mut scored: Vec<(i32, Uuid)> = candidates
        .iter()
        .filter(|c| c.id != source.id)
        .map(|c| (tag_score(source, c), c.id))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(k as usize)
        .map(|(score, asset_id)| SearchHit { asset_id, score: score as f64 })
        .collect()
}

/// Rows the public catalog may show.
pub fn visible() -> Condition {
    Condition::all()
        .add(asset::Column::IngestionStatus.is_in([IngestionStatus::Ready, IngestionStatus::Analyzed]))
        .add(asset::Column::DriveFileId.is_not_null())
        .add(asset::Column::Style.is_not_null())
}

/// Case-insensitive substring match over the given text columns.
pub fn substring_match(columns: &[asset::Column], needle: &str) -> Condition {
    let pattern = format!("%{}%", needle.trim().to_lowercase());
    columns.iter().fold(Condition::any(), |cond, col| {
        cond.add(Expr::expr(Func::lower(Expr::col((asset::Entity, *col)))).like(pattern.clone()))
    })
}

pub struct TagSearch {
    db: Arc<DatabaseConnection>,
}

impl TagSearch {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SearchStrategy for TagSearch {
    fn name(&self) -> &'static str {
        "tags"
    }

    async fn similar(&self, source: &asset::Model, k: u64) -> Result<Vec<SearchHit>, SearchError> {
        let mut overlap = Condition::any();
        for (col, value) in [
            (asset::Column::Style, &source.style),
            (asset::Column::Mood, &source.mood),
            (asset::Column::Subject, &source.subject),
        ] {
            if let Some(v) = value {
                overlap = overlap.add(col.eq(v.clone()));
            }
        }

        let candidates = asset::Entity::find()
            .filter(visible())
            .filter(asset::Column::Id.ne(source.id))
            .filter(overlap)
            .order_by_desc(asset::Column::CreatedAt)
            .limit(TAG_CANDIDATES)
            .all(self.db.as_ref())
            .await?;
        Ok(rank_by_tags(source, candidates, k))
    }

    async fn text(&self, query: &str, k: u64) -> Result<Vec<SearchHit>, SearchError> {
        let rows = asset::Entity::find()
            .filter(visible())
            .filter(substring_match(
                &[
                    asset::Column::Title,
                    asset::Column::Style,
                    asset::Column::Mood,
                    asset::Column::Artist,
                ],
                query,
            ))
            .order_by_desc(asset::Column::CreatedAt)
            .limit(k)
            .all(self.db.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| SearchHit { asset_id: r.id, score: 0.0 })
            .collect())
    }
}

/// Primary strategy first; the fallback answers when the primary errors or
/// comes back empty.
pub struct Fallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> Fallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P: SearchStrategy, F: SearchStrategy> SearchStrategy for Fallback<P, F> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn similar(&self, source: &asset::Model, k: u64) -> Result<Vec<SearchHit>, SearchError> {
        match self.primary.similar(source, k).await {
            Ok(hits) if !hits.is_empty() => Ok(hits),
            Ok(_) => self.fallback.similar(source, k).await,
            Err(e) => {
                tracing::debug!("Search | {} similar unavailable ({}), using {}", self.primary.name(), e, self.fallback.name());
                self.fallback.similar(source, k).await
            }
        }
    }

    async fn text(&self, query: &str, k: u64) -> Result<Vec<SearchHit>, SearchError> {
        match self.primary.text(query, k).await {
            Ok(hits) if !hits.is_empty() => Ok(hits),
            Ok(_) => self.fallback.text(query, k).await,
            Err(e) => {
                tracing::debug!("Search | {} text unavailable ({}), using {}", self.primary.name(), e, self.fallback.name());
                self.fallback.text(query, k).await
            }
        }
    }
}
