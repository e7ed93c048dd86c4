//! Operator endpoints. Every route here sits behind the admin bearer token.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::NaiveDateTime;
use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entities::pipeline_run::{self, RunStatus};
use crate::error::AppError;
use crate::middleware::auth::AdminUser;
use crate::models::images::image_url;
use crate::pagination::{PaginatedResponse, Pagination};
use crate::services::drip::payload::PRODUCT_IMAGE_WIDTH;
use crate::services::drip::{DripCommand, DripHandle, DripStatus};
use crate::services::printful::{CostEstimate, FulfillmentProvider, OrderRequest, ProviderOrder, Recipient, ShippingRate};
use crate::services::scanner::{ScanMode, ScanOutcome};
use crate::AppState;

fn drip(state: &AppState) -> Result<&DripHandle, AppError> {
    state
        .pipeline
        .drip()
        .ok_or_else(|| AppError::ServiceUnavailable("Catalog sync is not configured".to_string()))
}

fn fulfillment(state: &AppState) -> Result<&Arc<dyn FulfillmentProvider>, AppError> {
    state
        .fulfillment
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Fulfillment provider is not configured".to_string()))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StartQuery {
    /// Stop after this many variants have been created.
    pub cap: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/admin/drip/start",
    params(StartQuery),
    responses(
        (status = 200, description = "Worker started or already running", body = DripStatus),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Catalog sync not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn drip_start(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Query(query): Query<StartQuery>,
) -> Result<Json<DripStatus>, AppError> {
    let handle = drip(&state)?;
    tracing::info!("Admin | {} started the drip (cap {:?})", admin.subject, query.cap);
    handle.send(DripCommand::Start { cap: query.cap }).await?;
    Ok(Json(handle.status()))
}

async fn drip_command(state: &AppState, admin: &AdminUser, command: DripCommand) -> Result<Json<DripStatus>, AppError> {
    let handle = drip(state)?;
    tracing::info!("Admin | {} sent {:?} to the drip", admin.subject, command);
    handle.send(command).await?;
    Ok(Json(handle.status()))
}

#[utoipa::path(
    post,
    path = "/admin/drip/stop",
    responses((status = 200, description = "Stop requested", body = DripStatus)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn drip_stop(State(state): State<AppState>, Extension(admin): Extension<AdminUser>) -> Result<Json<DripStatus>, AppError> {
    drip_command(&state, &admin, DripCommand::Stop).await
}

#[utoipa::path(
    post,
    path = "/admin/drip/pause",
    responses((status = 200, description = "Pause requested", body = DripStatus)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn drip_pause(State(state): State<AppState>, Extension(admin): Extension<AdminUser>) -> Result<Json<DripStatus>, AppError> {
    drip_command(&state, &admin, DripCommand::Pause).await
}

#[utoipa::path(
    post,
    path = "/admin/drip/resume",
    responses((status = 200, description = "Resume requested", body = DripStatus)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn drip_resume(State(state): State<AppState>, Extension(admin): Extension<AdminUser>) -> Result<Json<DripStatus>, AppError> {
    drip_command(&state, &admin, DripCommand::Resume).await
}

#[utoipa::path(
    get,
    path = "/admin/drip/status",
    responses((status = 200, description = "Current worker state and session counters", body = DripStatus)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn drip_status(State(state): State<AppState>) -> Result<Json<DripStatus>, AppError> {
    Ok(Json(drip(&state)?.status()))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ScanQuery {
    /// Walk the whole tree instead of reading changes.
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResponse {
    /// `started`, `already_running`, `stopped` or `not_running`.
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/admin/scan",
    params(ScanQuery),
    responses(
        (status = 202, description = "Scan started in the background", body = TriggerResponse),
        (status = 200, description = "A scan is already in flight", body = TriggerResponse),
        (status = 503, description = "File tree not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn trigger_scan(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Query(query): Query<ScanQuery>,
) -> Result<impl IntoResponse, AppError> {
    if state.pipeline.drive().is_none() {
        return Err(AppError::ServiceUnavailable("File tree is not configured".to_string()));
    }
    if state.pipeline.is_scanning() {
        return Ok((StatusCode::OK, Json(TriggerResponse { status: "already_running".to_string() })));
    }

    let mode = if query.full { ScanMode::Full } else { ScanMode::Delta };
    tracing::info!("Admin | {} triggered a {:?} scan", admin.subject, mode);
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        match pipeline.scan(mode).await {
            Ok(ScanOutcome::Completed(report)) => {
                tracing::info!("Admin | Manual scan inserted {} assets", report.ingest.inserted)
            }
            Ok(ScanOutcome::AlreadyRunning) => tracing::info!("Admin | Manual scan skipped, already running"),
            Err(e) => tracing::error!("Admin | Manual scan failed: {}", e),
        }
    });
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { status: "started".to_string() })))
}

#[utoipa::path(
    post,
    path = "/admin/watch/start",
    responses((status = 200, description = "Delta-scan loop started or already running", body = TriggerResponse)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn watch_start(State(state): State<AppState>) -> Result<Json<TriggerResponse>, AppError> {
    let started = state.pipeline.start_watch()?;
    Ok(Json(TriggerResponse {
        status: if started { "started" } else { "already_running" }.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/watch/stop",
    responses((status = 200, description = "Delta-scan loop stopped", body = TriggerResponse)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn watch_stop(State(state): State<AppState>) -> Json<TriggerResponse> {
    let stopped = state.pipeline.stop_watch();
    Json(TriggerResponse {
        status: if stopped { "stopped" } else { "not_running" }.to_string(),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunView {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub run_type: String,
    pub status: RunStatus,
    pub items_processed: i32,
    pub items_succeeded: i32,
    pub items_failed: i32,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub error: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

impl From<pipeline_run::Model> for RunView {
    fn from(m: pipeline_run::Model) -> Self {
        Self {
            id: m.id,
            run_type: m.run_type,
            status: m.status,
            items_processed: m.items_processed,
            items_succeeded: m.items_succeeded,
            items_failed: m.items_failed,
            started_at: m.started_at,
            finished_at: m.finished_at,
            error: m.error,
            metadata: m.metadata,
        }
    }
}

#[utoipa::path(
    get,
    path = "/admin/runs",
    params(Pagination),
    responses((status = 200, description = "Pipeline runs, newest first", body = PaginatedResponse<RunView>)),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_runs(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<RunView>>, AppError> {
    let (page, per_page) = pagination.resolve();
    let paginator = pipeline_run::Entity::find()
        .order_by_desc(pipeline_run::Column::StartedAt)
        .paginate(state.db.as_ref(), per_page);
    let total = paginator.num_items().await?;
    let runs = paginator.fetch_page(page - 1).await?;

    Ok(Json(PaginatedResponse::new(
        runs.into_iter().map(RunView::from).collect(),
        total,
        page,
        per_page,
    )))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrdersQuery {
    #[serde(default)]
    pub offset: u64,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/admin/fulfillment/orders",
    params(OrdersQuery),
    responses(
        (status = 200, description = "Orders known to the fulfillment provider", body = [ProviderOrder]),
        (status = 503, description = "Fulfillment provider not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_provider_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<ProviderOrder>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let orders = fulfillment(&state)?.list_orders(query.offset, limit).await?;
    Ok(Json(orders))
}

#[utoipa::path(
    post,
    path = "/admin/fulfillment/orders/{id}/confirm",
    params(("id" = i64, Path, description = "Provider order id")),
    responses(
        (status = 200, description = "Draft order submitted for production", body = ProviderOrder),
        (status = 503, description = "Fulfillment provider not configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn confirm_provider_order(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminUser>,
    Path(id): Path<i64>,
) -> Result<Json<ProviderOrder>, AppError> {
    let order = fulfillment(&state)?.confirm_order(id).await?;
    tracing::info!("Admin | {} confirmed provider order {} ({})", admin.subject, id, order.status);
    Ok(Json(order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub recipient: Recipient,
    /// Size label, e.g. `Medium`.
    pub size: String,
    pub frame: Option<String>,
    pub quantity: Option<u32>,
    pub drive_file_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteResponse {
    pub variant_id: i64,
    pub cost: CostEstimate,
    pub shipping_rates: Vec<ShippingRate>,
}

#[utoipa::path(
    post,
    path = "/admin/fulfillment/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Cost estimate and shipping options", body = QuoteResponse),
        (status = 400, description = "No provider variant for the size and frame")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let provider = fulfillment(&state)?;
    let variant_id = state
        .price_map
        .fulfillment_variant(&request.size, request.frame.as_deref())
        .ok_or_else(|| AppError::BadRequest(format!("No fulfillment variant for size {}", request.size)))?;
    let image = image_url(&state.config.image_base_url, &request.drive_file_id, PRODUCT_IMAGE_WIDTH);
    let order = OrderRequest::single(
        format!("quote-{}", Uuid::new_v4().simple()),
        request.recipient,
        variant_id,
        request.quantity.unwrap_or(1),
        &image,
    );

    let cost = provider.estimate_cost(&order).await?;
    let shipping_rates = provider.shipping_rates(&order.recipient, &order.items).await?;
    Ok(Json(QuoteResponse {
        variant_id,
        cost,
        shipping_rates,
    }))
}
