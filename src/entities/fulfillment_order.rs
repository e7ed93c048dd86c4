use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "fulfillment_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: i64,
    pub order_name: Option<String>,
    pub line_item_id: i64,
    pub asset_id: Option<Uuid>,
    pub drive_file_id: Option<String>,
    pub artwork_title: Option<String>,
    pub artist: Option<String>,
    pub size: Option<String>,
    pub frame: Option<String>,
    pub price_tier: Option<String>,
    pub preview_url: Option<String>,
    pub quantity: i32,
    pub recipient: Json,
    pub status: String, // pending, paid, sent_to_printful, fulfilled, cancelled
    pub printful_order_id: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::asset::Entity",
        from = "Column::AssetId",
        to = "super::asset::Column::Id",
        on_delete = "SetNull"
    )]
    Asset,
}

impl Related<super::asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Asset.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
