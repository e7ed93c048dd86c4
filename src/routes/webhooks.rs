use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::services::orders::{verify_signature, IntakeReport, OrderNotification, HMAC_HEADER};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct PaidResponse {
    pub order_id: i64,
    pub updated: u64,
}

/// Checks the HMAC header against the raw body and decodes it.
fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<OrderNotification, AppError> {
    let secret = state
        .config
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Webhook secret not configured".to_string()))?;

    let provided = headers.get(HMAC_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(secret, body, provided) {
        tracing::warn!("Webhooks | Rejected notification with a bad or missing signature");
        return Err(AppError::Unauthorized("Invalid signature".to_string()));
    }

    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid order payload: {e}")))
}

#[utoipa::path(
    post,
    path = "/webhooks/orders/create",
    request_body(content = String, description = "Order notification JSON, signed in the x-shopify-hmac-sha256 header", content_type = "application/json"),
    responses(
        (status = 200, description = "Catalog line items recorded", body = IntakeReport),
        (status = 401, description = "Signature mismatch or missing"),
        (status = 503, description = "Webhook secret not configured")
    ),
    tag = "Webhooks"
)]
pub async fn order_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IntakeReport>, AppError> {
    let order = authenticate(&state, &headers, &body)?;
    tracing::info!("Webhooks | orders/create {} with {} line items", order.id, order.line_items.len());
    let report = state.orders.record_created(&order).await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/webhooks/orders/paid",
    request_body(content = String, description = "Order notification JSON, signed in the x-shopify-hmac-sha256 header", content_type = "application/json"),
    responses(
        (status = 200, description = "Pending rows moved to paid", body = PaidResponse),
        (status = 401, description = "Signature mismatch or missing"),
        (status = 503, description = "Webhook secret not configured")
    ),
    tag = "Webhooks"
)]
pub async fn order_paid(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PaidResponse>, AppError> {
    let order = authenticate(&state, &headers, &body)?;
    let updated = state.orders.record_paid(&order).await?;
    Ok(Json(PaidResponse {
        order_id: order.id,
        updated,
    }))
}
