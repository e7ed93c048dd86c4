use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Redirect, Response},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::asset;
use crate::error::AppError;
use crate::routes::catalog::{cache_for, CatalogItem};
use crate::services::embedding::search::SearchHit;
use crate::AppState;

const DEFAULT_LIMIT: u64 = 24;
const DEFAULT_SIMILAR: u64 = 12;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Free text.
    pub q: Option<String>,
    #[param(default = 24, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SimilarQuery {
    #[param(default = 12, minimum = 1, maximum = 100)]
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResults {
    pub strategy: String,
    pub results: Vec<CatalogItem>,
}

/// Loads the hit rows and returns them in hit order with their scores.
pub(crate) async fn hydrate(db: &DatabaseConnection, hits: Vec<SearchHit>, image_base: &str) -> Result<Vec<CatalogItem>, AppError> {
    if hits.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = hits.iter().map(|h| h.asset_id).collect();
    let mut rows: HashMap<Uuid, asset::Model> = asset::Entity::find()
        .filter(asset::Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            rows.remove(&hit.asset_id).map(|a| {
                let mut item = CatalogItem::from_model(a, image_base);
                item.score = Some(hit.score);
                item
            })
        })
        .collect())
}

#[utoipa::path(
    get,
    path = "/api/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Assets matching the text, best first", body = SearchResults),
        (status = 400, description = "Empty query")
    ),
    tag = "Search"
)]
pub async fn text_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter q is required".to_string()))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let hits = state.search.text(q, limit).await?;
    let results = hydrate(state.db.as_ref(), hits, &state.config.image_base_url).await?;
    Ok((
        cache_for(300),
        Json(SearchResults {
            strategy: state.search.name().to_string(),
            results,
        }),
    ))
}

async fn similar_to(state: &AppState, source: asset::Model, limit: Option<u64>) -> Result<Response, AppError> {
    let limit = limit.unwrap_or(DEFAULT_SIMILAR).clamp(1, MAX_LIMIT);
    let hits = state.search.similar(&source, limit).await?;
    let results = hydrate(state.db.as_ref(), hits, &state.config.image_base_url).await?;
    Ok((
        cache_for(3600),
        Json(SearchResults {
            strategy: state.search.name().to_string(),
            results,
        }),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/similar/{asset_id}",
    params(("asset_id" = Uuid, Path, description = "Asset id"), SimilarQuery),
    responses(
        (status = 200, description = "Visually or thematically similar assets", body = SearchResults),
        (status = 404, description = "Asset not found")
    ),
    tag = "Search"
)]
pub async fn similar(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    Query(query): Query<SimilarQuery>,
) -> Result<Response, AppError> {
    let source = asset::Entity::find_by_id(asset_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;
    similar_to(&state, source, query.limit).await
}

#[utoipa::path(
    get,
    path = "/api/v2/similar/{product_id}",
    params(("product_id" = String, Path, description = "Storefront product id"), SimilarQuery),
    responses(
        (status = 200, description = "Similar assets for the product's artwork", body = SearchResults),
        (status = 307, description = "No product matched; redirected to the asset-id endpoint")
    ),
    tag = "Search"
)]
pub async fn similar_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<SimilarQuery>,
) -> Result<Response, AppError> {
    let source = asset::Entity::find()
        .filter(asset::Column::ShopifyProductId.eq(product_id.as_str()))
        .one(state.db.as_ref())
        .await?;

    match source {
        Some(source) => similar_to(&state, source, query.limit).await,
        None => {
            tracing::debug!("Search | No asset for product {}, redirecting", product_id);
            let mut target = format!("/api/similar/{product_id}");
            if let Some(limit) = query.limit {
                target.push_str(&format!("?limit={limit}"));
            }
            Ok(Redirect::temporary(&target).into_response())
        }
    }
}
