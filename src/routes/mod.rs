mod admin;
mod analytics;
mod assets;
mod catalog;
mod home;
mod search;
mod trending;
mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::auth::admin_auth;
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        // General
        home::root,
        home::health,
        // Catalog
        catalog::browse,
        catalog::filters,
        catalog::artists,
        catalog::collections,
        catalog::price_map,
        assets::get_asset,
        trending::trending,
        // Search
        search::text_search,
        search::similar,
        search::similar_by_product,
        // Analytics
        analytics::track,
        // Webhooks
        webhooks::order_created,
        webhooks::order_paid,
        // Admin
        admin::drip_start,
        admin::drip_stop,
        admin::drip_pause,
        admin::drip_resume,
        admin::drip_status,
        admin::trigger_scan,
        admin::watch_start,
        admin::watch_stop,
        admin::list_runs,
        admin::list_provider_orders,
        admin::confirm_provider_order,
        admin::quote,
    ),
    components(
        schemas(
            home::HealthResponse,
            catalog::CatalogItem,
            catalog::ImageLink,
            catalog::MaxPrint,
            catalog::SortOrder,
            catalog::Facet,
            catalog::Filters,
            catalog::Collection,
            assets::AssetDetail,
            assets::VariantView,
            trending::Trending,
            search::SearchResults,
            analytics::EventInput,
            analytics::AnalyticsPayload,
            analytics::TrackResponse,
            webhooks::PaidResponse,
            admin::TriggerResponse,
            admin::RunView,
            admin::QuoteRequest,
            admin::QuoteResponse,
            crate::models::pricing::PriceTier,
            crate::entities::asset::QualityTier,
            crate::entities::pipeline_run::RunStatus,
            crate::services::drip::DripState,
            crate::services::drip::DripStatus,
            crate::services::orchestration::HealthReport,
            crate::services::orders::IntakeReport,
            crate::services::printful::Recipient,
            crate::services::printful::ProviderOrder,
            crate::services::printful::CostEstimate,
            crate::services::printful::ShippingRate,
        )
    ),
    tags(
        (name = "General", description = "Landing page and health"),
        (name = "Catalog", description = "Browsing, facets, asset detail and trending"),
        (name = "Search", description = "Text and similarity search"),
        (name = "Analytics", description = "Storefront event ingest"),
        (name = "Webhooks", description = "Signed order notifications from the storefront"),
        (name = "Admin", description = "Pipeline control (admin token required)")
    ),
    info(
        title = "PrintVault API",
        version = "0.1.0",
        description = "Fine-art print catalog: ingestion pipeline control, storefront read API and order intake",
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                )),
            );
        }
    }
}

pub fn create_routes(state: AppState) -> Router {
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    let admin_routes = Router::new()
        .route("/admin/drip/start", post(admin::drip_start))
        .route("/admin/drip/stop", post(admin::drip_stop))
        .route("/admin/drip/pause", post(admin::drip_pause))
        .route("/admin/drip/resume", post(admin::drip_resume))
        .route("/admin/drip/status", get(admin::drip_status))
        .route("/admin/scan", post(admin::trigger_scan))
        .route("/admin/watch/start", post(admin::watch_start))
        .route("/admin/watch/stop", post(admin::watch_stop))
        .route("/admin/runs", get(admin::list_runs))
        .route("/admin/fulfillment/orders", get(admin::list_provider_orders))
        .route("/admin/fulfillment/orders/{id}/confirm", post(admin::confirm_provider_order))
        .route("/admin/fulfillment/quote", post(admin::quote))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    let app_routes = Router::new()
        .route("/", get(home::root))
        .route("/health", get(home::health))
        .route("/api/catalog", get(catalog::browse))
        .route("/api/catalog/filters", get(catalog::filters))
        .route("/api/artists", get(catalog::artists))
        .route("/api/collections", get(catalog::collections))
        .route("/api/price-map", get(catalog::price_map))
        .route("/api/assets/{id}", get(assets::get_asset))
        .route("/api/trending", get(trending::trending))
        .route("/api/search", get(search::text_search))
        .route("/api/similar/{asset_id}", get(search::similar))
        .route("/api/v2/similar/{product_id}", get(search::similar_by_product))
        .route("/api/analytics", post(analytics::track))
        .route("/webhooks/orders/create", post(webhooks::order_created))
        .route("/webhooks/orders/paid", post(webhooks::order_paid))
        .merge(admin_routes)
        .with_state(state);

    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
