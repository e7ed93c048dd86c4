//! Write side of the asset catalog used by the scanner.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QuerySelect,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::asset::{self, IngestionStatus, QualityTier, ShopifyStatus};
use crate::entities::asset_variant;
use crate::models::dimensions::derive_geometry;
use crate::utils::error_message;

pub const NO_DIMENSIONS: &str = "No dimensions in filename";

/// A file discovered by the scanner, normalized for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub drive_file_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub md5_checksum: Option<String>,
    pub path: String,
    pub artist: String,
    pub quality_tier: QualityTier,
    pub title: String,
    pub width_px: u32,
    pub height_px: u32,
}

/// An asset row and its variant rows, ready to insert.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub asset: asset::Model,
    pub variants: Vec<asset_variant::Model>,
}

impl NewAsset {
    pub fn from_record(record: &FileRecord) -> Self {
        let now = Utc::now().naive_utc();
        let id = Uuid::new_v4();
        // Pixel columns are INT4; larger sides are treated as unknown.
        let geometry = i32::try_from(record.width_px)
            .ok()
            .zip(i32::try_from(record.height_px).ok())
            .and_then(|px| derive_geometry(record.width_px, record.height_px).map(|g| (px, g)));

        let mut asset = asset::Model {
            id,
            drive_file_id: Some(record.drive_file_id.clone()),
            filename: record.filename.clone(),
            path: Some(record.path.clone()),
            mime_type: Some(record.mime_type.clone()),
            size_bytes: record.size_bytes,
            md5_checksum: record.md5_checksum.clone(),
            width_px: None,
            height_px: None,
            aspect_ratio: None,
            ratio_class: None,
            max_print_width_cm: None,
            max_print_height_cm: None,
            quality_tier: Some(record.quality_tier),
            artist: Some(record.artist.clone()),
            title: Some(record.title.clone()),
            description: None,
            style: None,
            mood: None,
            subject: None,
            era: None,
            palette: None,
            ai_tags: Vec::new(),
            ingestion_status: IngestionStatus::Analyzed,
            shopify_status: ShopifyStatus::Pending,
            ingestion_error: None,
            shopify_product_id: None,
            shopify_product_gid: None,
            shopify_synced_at: None,
            created_at: now,
            updated_at: now,
        };

        let variants = match geometry {
            Some(((width_px, height_px), g)) => {
                asset.width_px = Some(width_px);
                asset.height_px = Some(height_px);
                asset.aspect_ratio = Some(g.aspect_ratio);
                asset.ratio_class = Some(g.ratio_class.as_str().to_string());
                asset.max_print_width_cm = Some(g.max_print.width_cm);
                asset.max_print_height_cm = Some(g.max_print.height_cm);
                g.variants
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| asset_variant::Model {
                        id: Uuid::new_v4(),
                        asset_id: id,
                        label: v.label,
                        width_cm: v.width_cm,
                        height_cm: v.height_cm,
                        width_inches: v.width_inches,
                        height_inches: v.height_inches,
                        effective_dpi: v.effective_dpi,
                        quality_grade: v.quality_grade.as_str().to_string(),
                        sort_order: i as i32,
                        created_at: now,
                    })
                    .collect()
            }
            None => {
                asset.ingestion_error = Some(NO_DIMENSIONS.to_string());
                Vec::new()
            }
        };

        Self { asset, variants }
    }

    /// A placeholder row for a file that could not be ingested.
    pub fn failed(record: &FileRecord, message: &str) -> Self {
        let mut row = Self::from_record(record);
        row.variants.clear();
        row.asset.ingestion_status = IngestionStatus::Error;
        row.asset.ingestion_error = Some(error_message(message));
        row
    }
}

#[async_trait]
pub trait AssetSink: Send + Sync {
    /// The subset of `ids` already stored.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, DbErr>;

    /// Inserts rows, ignoring any whose `drive_file_id` already exists.
    /// Returns how many asset rows were written.
    async fn insert_batch(&self, rows: &[NewAsset]) -> Result<u64, DbErr>;
}

pub struct DbAssetSink {
    db: Arc<DatabaseConnection>,
}

impl DbAssetSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AssetSink for DbAssetSink {
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, DbErr> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<Option<String>> = asset::Entity::find()
            .select_only()
            .column(asset::Column::DriveFileId)
            .filter(asset::Column::DriveFileId.is_in(ids.iter().cloned()))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn insert_batch(&self, rows: &[NewAsset]) -> Result<u64, DbErr> {
        if rows.is_empty() {
            return Ok(0);
        }

        let assets = rows
            .iter()
            .map(|r| r.asset.clone().into_active_model().reset_all());
        let inserted = asset::Entity::insert_many(assets)
            .on_conflict(
                OnConflict::column(asset::Column::DriveFileId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        // Conflicting rows were skipped; only attach variants to the ones that landed.
        let ids: Vec<Uuid> = rows.iter().map(|r| r.asset.id).collect();
        let landed: HashSet<Uuid> = asset::Entity::find()
            .select_only()
            .column(asset::Column::Id)
            .filter(asset::Column::Id.is_in(ids))
            .into_tuple::<Uuid>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .collect();

        let variants: Vec<asset_variant::ActiveModel> = rows
            .iter()
            .filter(|r| landed.contains(&r.asset.id))
            .flat_map(|r| r.variants.iter().cloned())
            .map(|v| v.into_active_model().reset_all())
            .collect();
        if !variants.is_empty() {
            asset_variant::Entity::insert_many(variants)
                .exec_without_returning(self.db.as_ref())
                .await?;
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(width_px: u32, height_px: u32) -> FileRecord {
        FileRecord {
            drive_file_id: "X".into(),
            filename: "Sunrise_4000x6000.jpg".into(),
            mime_type: "image/jpeg".into(),
            size_bytes: Some(1024),
            md5_checksum: None,
            path: "Artist/Above 300/Sunrise_4000x6000.jpg".into(),
            artist: "Artist".into(),
            quality_tier: QualityTier::High,
            title: "Sunrise".into(),
            width_px,
            height_px,
        }
    }

    #[test]
    fn geometry_is_filled_when_dimensions_are_known() {
        let row = NewAsset::from_record(&record(4000, 6000));
        assert_eq!(row.asset.ingestion_status, IngestionStatus::Analyzed);
        assert_eq!(row.asset.shopify_status, ShopifyStatus::Pending);
        assert_eq!(row.asset.ratio_class.as_deref(), Some("portrait_2_3"));
        assert_eq!(row.asset.max_print_width_cm, Some(112.9));
        assert!(row.asset.ingestion_error.is_none());
        assert_eq!(row.variants[0].label, "Small");
        assert!(row.variants.iter().all(|v| v.asset_id == row.asset.id));
        assert_eq!(row.variants.last().map(|v| v.sort_order), Some(row.variants.len() as i32 - 1));
    }

    #[test]
    fn missing_dimensions_leave_geometry_empty() {
        let row = NewAsset::from_record(&record(0, 0));
        assert_eq!(row.asset.ingestion_status, IngestionStatus::Analyzed);
        assert_eq!(row.asset.ingestion_error.as_deref(), Some(NO_DIMENSIONS));
        assert!(row.asset.width_px.is_none());
        assert!(row.asset.ratio_class.is_none());
        assert!(row.variants.is_empty());
    }

    #[test]
    fn oversized_dimensions_are_treated_as_unknown() {
        let row = NewAsset::from_record(&record(3_000_000_000, 2000));
        assert!(row.asset.width_px.is_none());
        assert!(row.asset.aspect_ratio.is_none());
        assert_eq!(row.asset.ingestion_error.as_deref(), Some(NO_DIMENSIONS));
        assert!(row.variants.is_empty());
    }

    #[test]
    fn failed_rows_carry_a_capped_message() {
        let row = NewAsset::failed(&record(4000, 6000), &"e".repeat(900));
        assert_eq!(row.asset.ingestion_status, IngestionStatus::Error);
        assert_eq!(row.asset.ingestion_error.as_ref().map(|m| m.len()), Some(500));
        assert!(row.variants.is_empty());
    }
}
