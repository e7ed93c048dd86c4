use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::asset::{self, ShopifyStatus};
use crate::error::AppError;
use crate::routes::catalog::{cache_for, CatalogItem};
use crate::routes::search::hydrate;
use crate::services::embedding::search::{visible, SearchHit};
use crate::AppState;

const DEFAULT_LIMIT: u64 = 12;
const PER_ARTIST: usize = 2;
/// Newest rows read per requested item when diversifying the fallback.
const FALLBACK_OVERFETCH: u64 = 5;

#[derive(Debug, Deserialize, IntoParams)]
pub struct TrendingQuery {
    #[param(default = 12, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Trending {
    /// `view` when served from recent activity, `newest` for the fallback.
    pub source: String,
    pub results: Vec<CatalogItem>,
}

#[derive(Debug, FromQueryResult)]
struct TrendingRow {
    asset_id: Uuid,
    score: f64,
}

async fn from_view(db: &DatabaseConnection, limit: u64) -> Result<Vec<SearchHit>, DbErr> {
    let rows = TrendingRow::find_by_statement(Statement::from_sql_and_values(
        db.get_database_backend(),
        "SELECT asset_id, score FROM trending_products ORDER BY score DESC LIMIT $1",
        [(limit as i64).into()],
    ))
    .all(db)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| SearchHit {
            asset_id: r.asset_id,
            score: r.score,
        })
        .collect())
}

/// Keeps input order but admits at most `per_artist` rows per artist.
pub fn diversify(rows: Vec<asset::Model>, per_artist: usize, limit: usize) -> Vec<asset::Model> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(limit);
    for row in rows {
        if out.len() >= limit {
            break;
        }
        let key = row.artist.as_deref().unwrap_or_default().to_lowercase();
        let count = seen.entry(key).or_default();
        if *count < per_artist {
            *count += 1;
            out.push(row);
        }
    }
    out
}

#[utoipa::path(
    get,
    path = "/api/trending",
    params(TrendingQuery),
    responses(
        (status = 200, description = "Trending assets, or the newest synced ones", body = Trending)
    ),
    tag = "Catalog"
)]
pub async fn trending(
    State(state): State<AppState>,
    Query(query): Query<TrendingQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 100);
    let image_base = &state.config.image_base_url;

    // The view may not be populated yet on a fresh database.
    let hits = match from_view(state.db.as_ref(), limit).await {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!("Trending | View unavailable: {}", e);
            Vec::new()
        }
    };
    let results = hydrate(state.db.as_ref(), hits, image_base).await?;
    if !results.is_empty() {
        return Ok((cache_for(1800), Json(Trending { source: "view".to_string(), results })));
    }

    let newest = asset::Entity::find()
        .filter(visible())
        .filter(asset::Column::ShopifyStatus.eq(ShopifyStatus::Synced))
        .order_by_desc(asset::Column::CreatedAt)
        .limit(limit * FALLBACK_OVERFETCH)
        .all(state.db.as_ref())
        .await?;
    let results = diversify(newest, PER_ARTIST, limit as usize)
        .into_iter()
        .map(|a| CatalogItem::from_model(a, image_base))
        .collect();
    Ok((cache_for(1800), Json(Trending { source: "newest".to_string(), results })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::tests::sample_asset;

    #[test]
    fn at_most_two_per_artist() {
        let mut rows: Vec<asset::Model> = (1..=4).map(sample_asset).collect();
        rows.push(asset::Model { artist: Some("Hokusai".into()), ..sample_asset(5) });
        rows.push(asset::Model { artist: None, ..sample_asset(6) });

        let picked: Vec<u128> = diversify(rows, PER_ARTIST, 10).iter().map(|a| a.id.as_u128()).collect();
        assert_eq!(picked, vec![1, 2, 5, 6]);
    }

    #[test]
    fn limit_is_respected() {
        let rows: Vec<asset::Model> = (1..=6)
            .map(|n| asset::Model { artist: Some(format!("Artist {n}")), ..sample_asset(n) })
            .collect();
        assert_eq!(diversify(rows, PER_ARTIST, 3).len(), 3);
    }
}
