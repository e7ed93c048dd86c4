use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub drive_file_id: Option<String>,
    pub filename: String,
    pub path: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub md5_checksum: Option<String>,
    pub width_px: Option<i32>,
    pub height_px: Option<i32>,
    pub aspect_ratio: Option<f64>,
    pub ratio_class: Option<String>,
    pub max_print_width_cm: Option<f64>,
    pub max_print_height_cm: Option<f64>,
    pub quality_tier: Option<QualityTier>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub style: Option<String>,
    pub mood: Option<String>,
    pub subject: Option<String>,
    pub era: Option<String>,
    pub palette: Option<String>,
    pub ai_tags: Vec<String>,
    pub ingestion_status: IngestionStatus,
    pub shopify_status: ShopifyStatus,
    pub ingestion_error: Option<String>,
    pub shopify_product_id: Option<String>,
    pub shopify_product_gid: Option<String>,
    pub shopify_synced_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "downloaded")]
    Downloaded,
    #[sea_orm(string_value = "analyzed")]
    Analyzed,
    #[sea_orm(string_value = "tagged")]
    Tagged,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ShopifyStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "synced")]
    Synced,
    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "standard")]
    Standard,
}

impl QualityTier {
    /// Quality buckets whose folder name mentions "above" hold the high tier.
    pub fn from_bucket_name(name: &str) -> Self {
        if name.to_lowercase().contains("above") {
            QualityTier::High
        } else {
            QualityTier::Standard
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::asset_variant::Entity")]
    AssetVariant,
    #[sea_orm(has_many = "super::fulfillment_order::Entity")]
    FulfillmentOrder,
}

impl Related<super::asset_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssetVariant.def()
    }
}

impl Related<super::fulfillment_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FulfillmentOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
