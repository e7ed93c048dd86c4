use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use rand::seq::SliceRandom;
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::asset;
use crate::error::AppError;
use crate::models::images::{image_set, CARD_WIDTHS};
use crate::models::pricing::{price_tier, PriceTier};
use crate::models::vocab::{CONTINENTS, COUNTRIES};
use crate::pagination::{PaginatedResponse, Pagination};
use crate::services::embedding::search::{substring_match, visible};
use crate::AppState;

pub(crate) fn cache_for(secs: u32) -> [(header::HeaderName, String); 1] {
    [(header::CACHE_CONTROL, format!("public, max-age={secs}"))]
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImageLink {
    pub width: u32,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaxPrint {
    pub width_cm: f64,
    pub height_cm: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub style: Option<String>,
    pub mood: Option<String>,
    pub subject: Option<String>,
    pub era: Option<String>,
    pub palette: Option<String>,
    pub ratio_class: Option<String>,
    pub ai_tags: Vec<String>,
    pub shopify_product_id: Option<String>,
    pub price_tier: Option<PriceTier>,
    pub price: Option<String>,
    pub compare_price: Option<String>,
    pub max_print: Option<MaxPrint>,
    pub images: Vec<ImageLink>,
    /// Similarity or tag score when the item comes from a search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl CatalogItem {
    pub fn from_model(asset: asset::Model, image_base: &str) -> Self {
        let max_print = match (asset.max_print_width_cm, asset.max_print_height_cm) {
            (Some(w), Some(h)) => Some(MaxPrint { width_cm: w, height_cm: h }),
            _ => None,
        };
        let tier = max_print.as_ref().map(|m| price_tier(m.width_cm, m.height_cm));
        let images = asset
            .drive_file_id
            .as_deref()
            .map(|id| {
                image_set(image_base, id, &CARD_WIDTHS)
                    .into_iter()
                    .map(|(width, url)| ImageLink { width, url })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: asset.id,
            title: asset.title,
            artist: asset.artist,
            style: asset.style,
            mood: asset.mood,
            subject: asset.subject,
            era: asset.era,
            palette: asset.palette,
            ratio_class: asset.ratio_class,
            ai_tags: asset.ai_tags,
            shopify_product_id: asset.shopify_product_id,
            price_tier: tier.as_ref().map(|t| t.tier),
            price: tier.as_ref().map(|t| t.price.clone()),
            compare_price: tier.map(|t| t.compare_price),
            max_print,
            images,
            score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    TitleAsc,
    TitleDesc,
    Random,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CatalogQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub artist: Option<String>,
    pub style: Option<String>,
    pub mood: Option<String>,
    /// Ratio class, e.g. `portrait_2_3`.
    pub orientation: Option<String>,
    pub era: Option<String>,
    pub subject: Option<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub tag: Option<String>,
    pub sort: Option<SortOrder>,
    /// Case-insensitive substring over title, style, mood, artist, era and subject.
    pub q: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Case-insensitive membership in `ai_tags`.
fn has_tag(value: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::cust_with_values(
        "EXISTS (SELECT 1 FROM unnest(\"assets\".\"ai_tags\") AS t WHERE lower(t) = lower(?))",
        [value.to_string()],
    )
}

pub(crate) fn filtered(query: &CatalogQuery) -> Select<asset::Entity> {
    let mut select = asset::Entity::find().filter(visible());

    for (column, value) in [
        (asset::Column::Artist, &query.artist),
        (asset::Column::Style, &query.style),
        (asset::Column::Mood, &query.mood),
        (asset::Column::RatioClass, &query.orientation),
        (asset::Column::Era, &query.era),
        (asset::Column::Subject, &query.subject),
    ] {
        if let Some(v) = present(value) {
            select = select.filter(column.eq(v));
        }
    }
    for value in [&query.country, &query.continent, &query.tag] {
        if let Some(v) = present(value) {
            select = select.filter(has_tag(v));
        }
    }
    if let Some(q) = present(&query.q) {
        select = select.filter(substring_match(
            &[
                asset::Column::Title,
                asset::Column::Style,
                asset::Column::Mood,
                asset::Column::Artist,
                asset::Column::Era,
                asset::Column::Subject,
            ],
            q,
        ));
    }
    select
}

fn ordered(select: Select<asset::Entity>, sort: SortOrder) -> Select<asset::Entity> {
    match sort {
        SortOrder::Newest | SortOrder::Random => select.order_by_desc(asset::Column::CreatedAt),
        SortOrder::Oldest => select.order_by_asc(asset::Column::CreatedAt),
        SortOrder::TitleAsc => select.order_by_asc(asset::Column::Title),
        SortOrder::TitleDesc => select.order_by_desc(asset::Column::Title),
    }
}

#[utoipa::path(
    get,
    path = "/api/catalog",
    params(CatalogQuery),
    responses(
        (status = 200, description = "One page of the visible catalog", body = PaginatedResponse<CatalogItem>)
    ),
    tag = "Catalog"
)]
pub async fn browse(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (page, per_page) = Pagination {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve();
    let sort = query.sort.unwrap_or_default();

    let paginator = ordered(filtered(&query), sort).paginate(state.db.as_ref(), per_page);
    let total = paginator.num_items().await?;
    let mut rows = paginator.fetch_page(page - 1).await?;
    if sort == SortOrder::Random {
        rows.shuffle(&mut rand::thread_rng());
    }

    let items = rows
        .into_iter()
        .map(|a| CatalogItem::from_model(a, &state.config.image_base_url))
        .collect();
    Ok((cache_for(60), Json(PaginatedResponse::new(items, total, page, per_page))))
}

#[derive(Debug, Clone, Serialize, ToSchema, FromQueryResult)]
pub struct Facet {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Filters {
    pub artists: Vec<Facet>,
    pub styles: Vec<Facet>,
    pub moods: Vec<Facet>,
    pub subjects: Vec<Facet>,
    pub eras: Vec<Facet>,
    pub palettes: Vec<Facet>,
    pub orientations: Vec<Facet>,
    pub continents: Vec<Facet>,
    pub countries: Vec<Facet>,
}

pub(crate) async fn facet(db: &sea_orm::DatabaseConnection, column: asset::Column) -> Result<Vec<Facet>, AppError> {
    Ok(asset::Entity::find()
        .select_only()
        .column_as(column, "value")
        .column_as(Expr::col((asset::Entity, asset::Column::Id)).count(), "count")
        .filter(visible())
        .filter(column.is_not_null())
        .group_by(column)
        .order_by_desc(Expr::cust("\"count\""))
        .into_model::<Facet>()
        .all(db)
        .await?)
}

/// Counts assets per place name found in their tags.
pub fn count_places(tag_lists: &[Vec<String>], places: &[&str]) -> Vec<Facet> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for tags in tag_lists {
        for place in places {
            if tags.iter().any(|t| t.eq_ignore_ascii_case(place)) {
                *counts.entry(*place).or_default() += 1;
            }
        }
    }
    let mut facets: Vec<Facet> = counts
        .into_iter()
        .map(|(value, count)| Facet {
            value: value.to_string(),
            count,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    facets
}

#[utoipa::path(
    get,
    path = "/api/catalog/filters",
    responses(
        (status = 200, description = "Distinct filter values with counts", body = Filters)
    ),
    tag = "Catalog"
)]
pub async fn filters(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let db = state.db.as_ref();
    let tag_lists: Vec<Vec<String>> = asset::Entity::find()
        .select_only()
        .column(asset::Column::AiTags)
        .filter(visible())
        .into_tuple()
        .all(db)
        .await?;

    let body = Filters {
        artists: facet(db, asset::Column::Artist).await?,
        styles: facet(db, asset::Column::Style).await?,
        moods: facet(db, asset::Column::Mood).await?,
        subjects: facet(db, asset::Column::Subject).await?,
        eras: facet(db, asset::Column::Era).await?,
        palettes: facet(db, asset::Column::Palette).await?,
        orientations: facet(db, asset::Column::RatioClass).await?,
        continents: count_places(&tag_lists, CONTINENTS),
        countries: count_places(&tag_lists, COUNTRIES),
    };
    Ok((cache_for(3600), Json(body)))
}

#[utoipa::path(
    get,
    path = "/api/artists",
    responses(
        (status = 200, description = "Artists with visible asset counts", body = [Facet])
    ),
    tag = "Catalog"
)]
pub async fn artists(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let artists = facet(state.db.as_ref(), asset::Column::Artist).await?;
    Ok((cache_for(3600), Json(artists)))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub handle: String,
    pub title: String,
    pub style: String,
    pub count: i64,
    pub cover: Option<CatalogItem>,
}

pub fn handle_for(style: &str) -> String {
    style
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[utoipa::path(
    get,
    path = "/api/collections",
    responses(
        (status = 200, description = "Style collections with a cover asset", body = [Collection])
    ),
    tag = "Catalog"
)]
pub async fn collections(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let styles = facet(state.db.as_ref(), asset::Column::Style).await?;
    let mut out = Vec::with_capacity(styles.len());
    for style in styles {
        let cover = asset::Entity::find()
            .filter(visible())
            .filter(asset::Column::Style.eq(style.value.as_str()))
            .order_by_desc(asset::Column::CreatedAt)
            .one(state.db.as_ref())
            .await?
            .map(|a| CatalogItem::from_model(a, &state.config.image_base_url));
        out.push(Collection {
            handle: handle_for(&style.value),
            title: format!("{} Prints", style.value),
            style: style.value,
            count: style.count,
            cover,
        });
    }
    Ok((cache_for(1800), Json(out)))
}

#[utoipa::path(
    get,
    path = "/api/price-map",
    responses(
        (status = 200, description = "The skeleton price map document", content_type = "application/json")
    ),
    tag = "Catalog"
)]
pub async fn price_map(State(state): State<AppState>) -> impl IntoResponse {
    (cache_for(3600), Json(state.price_map.as_ref().clone()))
}
