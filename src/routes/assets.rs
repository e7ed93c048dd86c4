use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::asset::{self, QualityTier};
use crate::entities::asset_variant;
use crate::error::AppError;
use crate::models::images::{image_set, DETAIL_WIDTHS};
use crate::models::pricing::{price_tier, PriceTier};
use crate::routes::catalog::{cache_for, CatalogItem, ImageLink};
use crate::services::drip::payload::description_for;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantView {
    pub label: String,
    pub width_cm: f64,
    pub height_cm: f64,
    pub width_inches: f64,
    pub height_inches: f64,
    pub effective_dpi: f64,
    pub quality_grade: String,
    pub price_tier: PriceTier,
    pub price: String,
    pub compare_price: String,
}

impl From<asset_variant::Model> for VariantView {
    fn from(v: asset_variant::Model) -> Self {
        let tier = price_tier(v.width_cm, v.height_cm);
        Self {
            label: v.label,
            width_cm: v.width_cm,
            height_cm: v.height_cm,
            width_inches: v.width_inches,
            height_inches: v.height_inches,
            effective_dpi: v.effective_dpi,
            quality_grade: v.quality_grade,
            price_tier: tier.tier,
            price: tier.price,
            compare_price: tier.compare_price,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetail {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub filename: String,
    pub description: String,
    pub width_px: Option<i32>,
    pub height_px: Option<i32>,
    pub aspect_ratio: Option<f64>,
    pub quality_tier: Option<QualityTier>,
    pub variants: Vec<VariantView>,
    #[schema(value_type = Object)]
    pub price_map: serde_json::Value,
}

pub fn detail(asset: asset::Model, variants: Vec<asset_variant::Model>, image_base: &str, price_map: serde_json::Value) -> AssetDetail {
    let description = description_for(&asset);
    let filename = asset.filename.clone();
    let (width_px, height_px, aspect_ratio) = (asset.width_px, asset.height_px, asset.aspect_ratio);
    let quality_tier = asset.quality_tier;
    let drive_file_id = asset.drive_file_id.clone();

    let mut item = CatalogItem::from_model(asset, image_base);
    item.images = drive_file_id
        .as_deref()
        .map(|id| {
            image_set(image_base, id, &DETAIL_WIDTHS)
                .into_iter()
                .map(|(width, url)| ImageLink { width, url })
                .collect()
        })
        .unwrap_or_default();

    AssetDetail {
        item,
        filename,
        description,
        width_px,
        height_px,
        aspect_ratio,
        quality_tier,
        variants: variants.into_iter().map(VariantView::from).collect(),
        price_map,
    }
}

#[utoipa::path(
    get,
    path = "/api/assets/{id}",
    params(("id" = Uuid, Path, description = "Asset id")),
    responses(
        (status = 200, description = "Asset with its print variants", body = AssetDetail),
        (status = 404, description = "Asset not found")
    ),
    tag = "Catalog"
)]
pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let asset = asset::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;

    let variants = asset_variant::Entity::find()
        .filter(asset_variant::Column::AssetId.eq(id))
        .order_by_asc(asset_variant::Column::SortOrder)
        .all(state.db.as_ref())
        .await?;

    let price_map = serde_json::to_value(state.price_map.as_ref())
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let body = detail(asset, variants, &state.config.image_base_url, price_map);
    Ok((cache_for(300), Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::tests::sample_asset;
    use chrono::Utc;

    fn variant(label: &str, w: f64, h: f64, order: i32) -> asset_variant::Model {
        asset_variant::Model {
            id: Uuid::new_v4(),
            asset_id: Uuid::from_u128(1),
            label: label.to_string(),
            width_cm: w,
            height_cm: h,
            width_inches: w / 2.54,
            height_inches: h / 2.54,
            effective_dpi: 300.0,
            quality_grade: "excellent".to_string(),
            sort_order: order,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn detail_prices_each_variant_by_its_own_area() {
        let asset = asset::Model { description: None, ..sample_asset(1) };
        let body = detail(
            asset,
            vec![variant("Small", 20.0, 30.0, 0), variant("Large", 50.0, 75.0, 2)],
            "https://img.example",
            serde_json::json!({}),
        );

        assert_eq!(body.variants[0].price_tier, PriceTier::Small);
        assert_eq!(body.variants[0].price, "29.99");
        assert_eq!(body.variants[1].price_tier, PriceTier::Large);
        assert_eq!(body.item.images.len(), 5);
        assert!(body.item.images[4].url.ends_with("=w2000"));
        assert!(body.description.ends_with("ready to frame."));
    }
}
