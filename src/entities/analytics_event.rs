use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "analytics_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub event_type: EventType,
    pub product_id: Option<String>,
    pub asset_id: Option<Uuid>,
    pub collection_id: Option<String>,
    pub search_query: Option<String>,
    pub session_id: String,
    pub metadata: Json,
    pub created_at: DateTime,
}

#[derive(EnumIter, DeriveActiveEnum, Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[sea_orm(string_value = "impression")]
    Impression,
    #[sea_orm(string_value = "click")]
    Click,
    #[sea_orm(string_value = "view")]
    View,
    #[sea_orm(string_value = "add_to_cart")]
    AddToCart,
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "search")]
    Search,
}

impl EventType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "impression" => Some(EventType::Impression),
            "click" => Some(EventType::Click),
            "view" => Some(EventType::View),
            "add_to_cart" => Some(EventType::AddToCart),
            "purchase" => Some(EventType::Purchase),
            "search" => Some(EventType::Search),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
