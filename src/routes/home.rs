use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::drip::DripStatus;
use crate::services::orchestration::HealthReport;
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub version: String,
    #[serde(flatten)]
    pub checks: HealthReport,
    pub drip_status: Option<DripStatus>,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Welcome page HTML", content_type = "text/html")
    ),
    tag = "General"
)]
pub async fn root() -> Html<&'static str> {
    Html(r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>PrintVault</title>
            <style>
                body {
                    display: flex;
                    flex-direction: column;
                    justify-content: center;
                    align-items: center;
                    height: 100vh;
                    margin: 0;
                    font-family: Georgia, serif;
                    background-color: #f7f4ee;
                }
                h1 {
                    color: #2b2620;
                }
                p {
                    color: #6b6258;
                }
                a {
                    margin-top: 20px;
                    padding: 10px 20px;
                    background-color: #2b2620;
                    color: #f7f4ee;
                    text-decoration: none;
                    border-radius: 4px;
                }
            </style>
        </head>
        <body>
            <h1>PrintVault</h1>
            <p>Catalog, search and order intake for fine-art prints.</p>
            <a href="/swagger-ui/">Explore API Docs</a>
        </body>
        </html>
    "#)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "All required dependencies reachable", body = HealthResponse),
        (status = 503, description = "The relational store is unreachable", body = HealthResponse)
    ),
    tag = "General"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let checks = state.pipeline.health().await;
    let code = if checks.store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if checks.store { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        drip_status: state.pipeline.drip().map(|d| d.status()),
        checks,
    };
    (code, Json(body))
}
