//! Inbound order notifications: signature check, line-item extraction,
//! fulfillment rows and purchase analytics.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::analytics_event::{self, EventType};
use crate::entities::fulfillment_order;
use crate::models::images::image_url;
use crate::models::pricing::PriceMap;
use crate::services::printful::{recipient_from_address, FulfillmentError, FulfillmentProvider, OrderRequest};
use crate::utils::error_message;

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const ARTWORK_PROPERTY: &str = "Artwork";

type HmacSha256 = Hmac<Sha256>;

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            STANDARD.encode(mac.finalize().into_bytes())
        }
        // HMAC takes keys of any length.
        Err(_) => String::new(),
    }
}

/// Constant-time check of a provided signature against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], provided: Option<&str>) -> bool {
    let Some(provided) = provided.map(str::trim).filter(|p| !p.is_empty()) else {
        return false;
    };
    let Ok(expected) = STANDARD.decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderNotification {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<serde_json::Value>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub id: i64,
    #[serde(default = "one")]
    pub quantity: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub properties: Vec<LineProperty>,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineProperty {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl LineItem {
    /// Properties indexed by name; non-string values are rendered as JSON.
    pub fn property_map(&self) -> HashMap<&str, String> {
        self.properties
            .iter()
            .map(|p| {
                let value = match &p.value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (p.name.as_str(), value)
            })
            .collect()
    }
}

/// The asset coordinate carried by a catalog line item.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkLine {
    pub line_item_id: i64,
    pub quantity: i32,
    pub artwork_title: String,
    pub artist: Option<String>,
    pub size: Option<String>,
    pub frame: Option<String>,
    pub asset_id: Option<Uuid>,
    pub drive_file_id: Option<String>,
    pub price_tier: Option<String>,
    pub preview_url: Option<String>,
    pub price: Option<String>,
}

/// Line items carrying an `Artwork` property; others are ignored.
pub fn artwork_lines(order: &OrderNotification) -> Vec<ArtworkLine> {
    order
        .line_items
        .iter()
        .filter_map(|item| {
            let props = item.property_map();
            let title = props.get(ARTWORK_PROPERTY)?.clone();
            let get = |key: &str| props.get(key).filter(|v| !v.is_empty()).cloned();
            Some(ArtworkLine {
                line_item_id: item.id,
                quantity: item.quantity.max(1),
                artwork_title: title,
                artist: get("Artist"),
                size: get("Size"),
                frame: get("Frame"),
                asset_id: get("_asset_id").and_then(|v| Uuid::parse_str(&v).ok()),
                drive_file_id: get("_drive_file_id"),
                price_tier: get("_price_tier"),
                preview_url: get("_preview"),
                price: item.price.clone(),
            })
        })
        .collect()
}

/// Everything the provider needs to print one line item.
pub struct PrintJob<'a> {
    pub external_id: String,
    pub size: Option<&'a str>,
    pub frame: Option<&'a str>,
    pub drive_file_id: Option<&'a str>,
    pub preview_url: Option<&'a str>,
    pub quantity: i32,
    pub address: &'a serde_json::Value,
    pub email: Option<&'a str>,
}

pub fn build_order_request(job: &PrintJob<'_>, price_map: &PriceMap, image_base: &str) -> Result<OrderRequest, FulfillmentError> {
    let size = job.size.unwrap_or_default();
    let variant_id = price_map
        .fulfillment_variant(size, job.frame)
        .ok_or_else(|| FulfillmentError::UnknownVariant(size.to_string()))?;
    let image = match (job.drive_file_id, job.preview_url) {
        (Some(id), _) => image_url(image_base, id, 2000),
        (None, Some(preview)) => preview.to_string(),
        (None, None) => return Err(FulfillmentError::Malformed("line item has no image".to_string())),
    };
    let recipient = recipient_from_address(job.address, job.email)
        .ok_or_else(|| FulfillmentError::Malformed("order has no usable shipping address".to_string()))?;
    Ok(OrderRequest::single(
        job.external_id.clone(),
        recipient,
        variant_id,
        job.quantity.max(1) as u32,
        &image,
    ))
}

/// Rebuilds the provider request for a stored fulfillment row.
pub fn request_for_row(
    row: &fulfillment_order::Model,
    price_map: &PriceMap,
    image_base: &str,
) -> Result<OrderRequest, FulfillmentError> {
    build_order_request(
        &PrintJob {
            external_id: format!("{}-{}", row.order_id, row.line_item_id),
            size: row.size.as_deref(),
            frame: row.frame.as_deref(),
            drive_file_id: row.drive_file_id.as_deref(),
            preview_url: row.preview_url.as_deref(),
            quantity: row.quantity,
            address: &row.recipient,
            email: None,
        },
        price_map,
        image_base,
    )
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct IntakeReport {
    pub order_id: i64,
    pub line_items: usize,
    pub recorded: usize,
    pub submitted: usize,
    pub submit_errors: usize,
}

pub struct OrderIntake {
    db: Arc<DatabaseConnection>,
    image_base: String,
    fulfillment: Option<Arc<dyn FulfillmentProvider>>,
    price_map: Option<Arc<PriceMap>>,
}

impl OrderIntake {
    pub fn new(db: Arc<DatabaseConnection>, image_base: impl Into<String>) -> Self {
        Self {
            db,
            image_base: image_base.into(),
            fulfillment: None,
            price_map: None,
        }
    }

    /// Submits each new catalog line item to the provider.
    pub fn with_auto_fulfill(mut self, provider: Arc<dyn FulfillmentProvider>, price_map: Arc<PriceMap>) -> Self {
        self.fulfillment = Some(provider);
        self.price_map = Some(price_map);
        self
    }

    /// Records an `orders/create` notification.
    pub async fn record_created(&self, order: &OrderNotification) -> Result<IntakeReport, DbErr> {
        let lines = artwork_lines(order);
        let mut report = IntakeReport {
            order_id: order.id,
            line_items: order.line_items.len(),
            ..Default::default()
        };
        if lines.is_empty() {
            tracing::info!("Order Intake | Order {} has no artwork line items", order.id);
            return Ok(report);
        }

        let recipient = order.shipping_address.clone().unwrap_or(serde_json::Value::Null);
        let now = Utc::now().naive_utc();

        for line in &lines {
            let row = fulfillment_order::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                order_name: Set(order.name.clone()),
                line_item_id: Set(line.line_item_id),
                asset_id: Set(line.asset_id),
                drive_file_id: Set(line.drive_file_id.clone()),
                artwork_title: Set(Some(line.artwork_title.clone())),
                artist: Set(line.artist.clone()),
                size: Set(line.size.clone()),
                frame: Set(line.frame.clone()),
                price_tier: Set(line.price_tier.clone()),
                preview_url: Set(line.preview_url.clone()),
                quantity: Set(line.quantity),
                recipient: Set(recipient.clone()),
                status: Set("pending".to_string()),
                printful_order_id: Set(None),
                error: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };
            // Redelivery refreshes the coordinate but never the status.
            fulfillment_order::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        fulfillment_order::Column::OrderId,
                        fulfillment_order::Column::LineItemId,
                    ])
                    .update_columns([
                        fulfillment_order::Column::OrderName,
                        fulfillment_order::Column::AssetId,
                        fulfillment_order::Column::DriveFileId,
                        fulfillment_order::Column::ArtworkTitle,
                        fulfillment_order::Column::Artist,
                        fulfillment_order::Column::Size,
                        fulfillment_order::Column::Frame,
                        fulfillment_order::Column::PriceTier,
                        fulfillment_order::Column::PreviewUrl,
                        fulfillment_order::Column::Quantity,
                        fulfillment_order::Column::Recipient,
                        fulfillment_order::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(self.db.as_ref())
                .await?;
            report.recorded += 1;
        }

        self.record_purchases(order, &lines).await?;

        if let (Some(provider), Some(price_map)) = (&self.fulfillment, &self.price_map) {
            let open = self.unsubmitted_lines(order.id).await?;
            for line in lines.iter().filter(|l| open.contains(&l.line_item_id)) {
                match self.submit(provider.as_ref(), price_map, order, line).await {
                    Ok(provider_id) => {
                        report.submitted += 1;
                        self.mark_submitted(order.id, line.line_item_id, provider_id).await?;
                    }
                    Err(e) => {
                        report.submit_errors += 1;
                        tracing::warn!(
                            "Order Intake | Fulfillment submit failed for {}/{}: {}",
                            order.id,
                            line.line_item_id,
                            e
                        );
                        self.mark_submit_error(order.id, line.line_item_id, &e.to_string()).await?;
                    }
                }
            }
        }

        tracing::info!(
            "Order Intake | Order {} recorded: {} artwork lines, {} submitted",
            order.id,
            report.recorded,
            report.submitted
        );
        Ok(report)
    }

    async fn record_purchases(&self, order: &OrderNotification, lines: &[ArtworkLine]) -> Result<(), DbErr> {
        let now = Utc::now().naive_utc();
        let events = lines.iter().map(|line| analytics_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_type: Set(EventType::Purchase),
            product_id: Set(None),
            asset_id: Set(line.asset_id),
            collection_id: Set(None),
            search_query: Set(None),
            session_id: Set(format!("order:{}", order.id)),
            metadata: Set(serde_json::json!({
                "order_id": order.id,
                "order_name": order.name,
                "line_item_id": line.line_item_id,
                "artwork": line.artwork_title,
                "artist": line.artist,
                "size": line.size,
                "frame": line.frame,
                "price_tier": line.price_tier,
                "price": line.price,
                "quantity": line.quantity,
            })),
            created_at: Set(now),
        });
        analytics_event::Entity::insert_many(events)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn submit(
        &self,
        provider: &dyn FulfillmentProvider,
        price_map: &PriceMap,
        order: &OrderNotification,
        line: &ArtworkLine,
    ) -> Result<i64, FulfillmentError> {
        let address = order.shipping_address.clone().unwrap_or(serde_json::Value::Null);
        let request = build_order_request(
            &PrintJob {
                external_id: format!("{}-{}", order.id, line.line_item_id),
                size: line.size.as_deref(),
                frame: line.frame.as_deref(),
                drive_file_id: line.drive_file_id.as_deref(),
                preview_url: line.preview_url.as_deref(),
                quantity: line.quantity,
                address: &address,
                email: order.email.as_deref(),
            },
            price_map,
            &self.image_base,
        )?;
        let created = provider.create_order(&request, false).await?;
        Ok(created.id)
    }

    /// Line items of `order_id` still waiting for a provider order.
    async fn unsubmitted_lines(&self, order_id: i64) -> Result<HashSet<i64>, DbErr> {
        let rows = fulfillment_order::Entity::find()
            .filter(fulfillment_order::Column::OrderId.eq(order_id))
            .all(self.db.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.printful_order_id.is_none() && matches!(row.status.as_str(), "pending" | "paid"))
            .map(|row| row.line_item_id)
            .collect())
    }

    async fn mark_submitted(&self, order_id: i64, line_item_id: i64, provider_id: i64) -> Result<(), DbErr> {
        fulfillment_order::Entity::update_many()
            .col_expr(fulfillment_order::Column::Status, Expr::value("sent_to_printful"))
            .col_expr(fulfillment_order::Column::PrintfulOrderId, Expr::value(provider_id))
            .col_expr(fulfillment_order::Column::Error, Expr::value(Option::<String>::None))
            .col_expr(fulfillment_order::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
            .filter(fulfillment_order::Column::OrderId.eq(order_id))
            .filter(fulfillment_order::Column::LineItemId.eq(line_item_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Keeps the status; a failed submit leaves `pending` or `paid` in place.
    async fn mark_submit_error(&self, order_id: i64, line_item_id: i64, error: &str) -> Result<(), DbErr> {
        fulfillment_order::Entity::update_many()
            .col_expr(fulfillment_order::Column::Error, Expr::value(error_message(error)))
            .col_expr(fulfillment_order::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
            .filter(fulfillment_order::Column::OrderId.eq(order_id))
            .filter(fulfillment_order::Column::LineItemId.eq(line_item_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Records an `orders/paid` notification. Rows not written yet are
    /// only logged.
    pub async fn record_paid(&self, order: &OrderNotification) -> Result<u64, DbErr> {
        let res = fulfillment_order::Entity::update_many()
            .col_expr(fulfillment_order::Column::Status, Expr::value("paid"))
            .col_expr(fulfillment_order::Column::UpdatedAt, Expr::value(Utc::now().naive_utc()))
            .filter(fulfillment_order::Column::OrderId.eq(order.id))
            .filter(fulfillment_order::Column::Status.eq("pending"))
            .exec(self.db.as_ref())
            .await?;
        if res.rows_affected == 0 {
            tracing::warn!("Order Intake | Paid notification for order {} matched no pending rows", order.id);
        } else {
            tracing::info!("Order Intake | Order {} paid ({} rows)", order.id, res.rows_affected);
        }
        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::printful::{CostEstimate, OrderItem, ProviderOrder, Recipient, ShippingRate};
    use async_trait::async_trait;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        created: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl FulfillmentProvider for CountingProvider {
        async fn create_order(&self, order: &OrderRequest, _confirm: bool) -> Result<ProviderOrder, FulfillmentError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FulfillmentError::Http { status: 400, message: "bad file".into() });
            }
            Ok(ProviderOrder {
                id: 900 + n as i64,
                status: "draft".into(),
                external_id: Some(order.external_id.clone()),
            })
        }
        async fn confirm_order(&self, _order_id: i64) -> Result<ProviderOrder, FulfillmentError> {
            Err(FulfillmentError::Malformed("unused".into()))
        }
        async fn list_orders(&self, _offset: u64, _limit: u64) -> Result<Vec<ProviderOrder>, FulfillmentError> {
            Ok(Vec::new())
        }
        async fn estimate_cost(&self, _order: &OrderRequest) -> Result<CostEstimate, FulfillmentError> {
            Err(FulfillmentError::Malformed("unused".into()))
        }
        async fn shipping_rates(&self, _recipient: &Recipient, _items: &[OrderItem]) -> Result<Vec<ShippingRate>, FulfillmentError> {
            Ok(Vec::new())
        }
    }

    fn stored_line(status: &str, printful_order_id: Option<i64>) -> fulfillment_order::Model {
        let now = Utc::now().naive_utc();
        fulfillment_order::Model {
            id: Uuid::new_v4(),
            order_id: 5001,
            order_name: Some("#1042".into()),
            line_item_id: 1,
            asset_id: Some(Uuid::from_u128(7)),
            drive_file_id: Some("drive-7".into()),
            artwork_title: Some("Water Lilies".into()),
            artist: Some("Claude Monet".into()),
            size: Some("30x40".into()),
            frame: Some("black".into()),
            price_tier: Some("medium".into()),
            preview_url: None,
            quantity: 2,
            recipient: order_json()["shipping_address"].clone(),
            status: status.into(),
            printful_order_id,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn variants() -> Arc<PriceMap> {
        Arc::new(serde_json::from_value(json!({"fulfillment_variants": {"30x40|black": 101}})).unwrap())
    }

    fn ok(rows: u64) -> MockExecResult {
        MockExecResult { last_insert_id: 0, rows_affected: rows }
    }

    fn order_json() -> serde_json::Value {
        json!({
            "id": 5001,
            "name": "#1042",
            "email": "buyer@example.com",
            "financial_status": "pending",
            "shipping_address": {
                "name": "Ada Lovelace", "address1": "1 Main St", "city": "Lagos",
                "country_code": "NG", "zip": "100001"
            },
            "line_items": [
                {
                    "id": 1, "quantity": 2, "title": "Medium Print", "price": "49.99",
                    "properties": [
                        {"name": "Artwork", "value": "Water Lilies"},
                        {"name": "Artist", "value": "Claude Monet"},
                        {"name": "Size", "value": "30x40"},
                        {"name": "Frame", "value": "black"},
                        {"name": "_asset_id", "value": "00000000-0000-0000-0000-000000000007"},
                        {"name": "_drive_file_id", "value": "drive-7"},
                        {"name": "_price_tier", "value": "medium"}
                    ]
                },
                {"id": 2, "title": "Gift card", "properties": []}
            ]
        })
    }

    #[test]
    fn signature_rejects_alteration_and_truncation() {
        let body = br#"{"id":5001}"#;
        let sig = sign("whsec", body);
        assert!(verify_signature("whsec", body, Some(&sig)));

        let mut altered = body.to_vec();
        altered[3] ^= 0x01;
        assert!(!verify_signature("whsec", &altered, Some(&sig)));
        assert!(!verify_signature("whsec", &body[..body.len() - 1], Some(&sig)));
        assert!(!verify_signature("other", body, Some(&sig)));
        assert!(!verify_signature("whsec", body, None));
        assert!(!verify_signature("whsec", body, Some("not base64!")));
    }

    #[test]
    fn only_artwork_lines_are_extracted() {
        let order: OrderNotification = serde_json::from_value(order_json()).unwrap();
        let lines = artwork_lines(&order);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.artwork_title, "Water Lilies");
        assert_eq!(line.size.as_deref(), Some("30x40"));
        assert_eq!(line.asset_id, Some(Uuid::from_u128(7)));
        assert_eq!(line.preview_url, None);
        assert_eq!(line.quantity, 2);
    }

    #[tokio::test]
    async fn created_order_writes_row_and_purchase_event() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .into_connection();
        let intake = OrderIntake::new(Arc::new(db), "https://img.example.com");
        let order: OrderNotification = serde_json::from_value(order_json()).unwrap();

        let report = intake.record_created(&order).await.unwrap();
        assert_eq!(report.line_items, 2);
        assert_eq!(report.recorded, 1);
        assert_eq!(report.submitted, 0);
    }

    #[test]
    fn print_request_resolves_variant_and_image() {
        let order: OrderNotification = serde_json::from_value(order_json()).unwrap();
        let line = &artwork_lines(&order)[0];
        let price_map: PriceMap = serde_json::from_value(json!({
            "fulfillment_variants": {"30x40|black": 101}
        }))
        .unwrap();
        let address = order.shipping_address.clone().unwrap();
        let job = PrintJob {
            external_id: "5001-1".into(),
            size: line.size.as_deref(),
            frame: line.frame.as_deref(),
            drive_file_id: line.drive_file_id.as_deref(),
            preview_url: None,
            quantity: line.quantity,
            address: &address,
            email: order.email.as_deref(),
        };
        let request = build_order_request(&job, &price_map, "https://img.example.com").unwrap();
        assert_eq!(request.items[0].variant_id, 101);
        assert_eq!(request.items[0].quantity, 2);
        assert_eq!(request.items[0].files[0].url, "https://img.example.com/drive-7=w2000");

        let unknown = PrintJob { size: Some("99x99"), ..job };
        assert!(matches!(
            build_order_request(&unknown, &price_map, "https://img.example.com"),
            Err(FulfillmentError::UnknownVariant(_))
        ));
    }

    #[tokio::test]
    async fn paid_before_created_is_tolerated() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 0 }])
            .into_connection();
        let intake = OrderIntake::new(Arc::new(db), "https://img.example.com");
        let order: OrderNotification = serde_json::from_value(json!({"id": 9})).unwrap();
        assert_eq!(intake.record_paid(&order).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn redelivered_order_is_submitted_once() {
        // Per delivery: row upsert, purchase event, then the stored-row read.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([ok(1), ok(1), ok(1), ok(1), ok(1)])
            .append_query_results([
                vec![stored_line("pending", None)],
                vec![stored_line("sent_to_printful", Some(900))],
            ])
            .into_connection();
        let provider = Arc::new(CountingProvider::default());
        let intake = OrderIntake::new(Arc::new(db), "https://img.example.com")
            .with_auto_fulfill(provider.clone(), variants());
        let order: OrderNotification = serde_json::from_value(order_json()).unwrap();

        let first = intake.record_created(&order).await.unwrap();
        assert_eq!(first.submitted, 1);
        let second = intake.record_created(&order).await.unwrap();
        assert_eq!(second.recorded, 1);
        assert_eq!(second.submitted, 0);

        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_submit_keeps_a_paid_line_retryable() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([ok(1), ok(1), ok(1)])
            .append_query_results([vec![stored_line("paid", None)]])
            .into_connection();
        let provider = Arc::new(CountingProvider { fail: true, ..Default::default() });
        let intake = OrderIntake::new(Arc::new(db), "https://img.example.com")
            .with_auto_fulfill(provider.clone(), variants());
        let order: OrderNotification = serde_json::from_value(order_json()).unwrap();

        let report = intake.record_created(&order).await.unwrap();
        assert_eq!(report.submitted, 0);
        assert_eq!(report.submit_errors, 1);
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
    }
}
