use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use printvault::config::Config;
use printvault::entities::asset;
use printvault::middleware::auth::mint_token;
use printvault::services::orchestration::Pipeline;
use printvault::services::orders::{sign, HMAC_HEADER};
use printvault::{create_routes, AppState};

const SECRET: &str = "whsec";

fn app(db: DatabaseConnection) -> Router {
    let db = Arc::new(db);
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&db)));
    create_routes(AppState::new(db, Config::for_tests(), pipeline))
}

fn empty_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn order_without_artwork() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": 820982911946154508i64,
        "name": "#1001",
        "email": "buyer@example.com",
        "line_items": [
            { "id": 1, "quantity": 1, "title": "Gift card", "properties": [] }
        ]
    }))
    .unwrap()
}

fn webhook(path: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header(HMAC_HEADER, sig);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn signed_order_is_accepted() {
    let body = order_without_artwork();
    let signature = sign(SECRET, &body);

    let response = app(empty_db())
        .oneshot(webhook("/webhooks/orders/create", body, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["line_items"], 1);
    assert_eq!(json["recorded"], 0);
}

#[tokio::test]
async fn altered_body_is_rejected() {
    let body = order_without_artwork();
    let signature = sign(SECRET, &body);
    let mut altered = body.clone();
    let last = altered.len() - 2;
    altered[last] ^= 0x01;

    let response = app(empty_db())
        .oneshot(webhook("/webhooks/orders/create", altered, Some(signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let response = app(empty_db())
        .oneshot(webhook("/webhooks/orders/create", order_without_artwork(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid signature");
}

#[tokio::test]
async fn paid_notification_updates_pending_rows() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection();
    let body = order_without_artwork();
    let signature = sign(SECRET, &body);

    let response = app(db)
        .oneshot(webhook("/webhooks/orders/paid", body, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["updated"], 1);
}

#[tokio::test]
async fn unknown_event_type_is_a_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/analytics")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"event_type":"hover","product_id":"1"}"#))
        .unwrap();

    let response = app(empty_db()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_asset_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<asset::Model>::new()])
        .into_connection();
    let request = Request::builder()
        .uri("/api/assets/6f1c2a6e-7d0b-4f59-9a8e-2f3c1e0d9b11")
        .body(Body::empty())
        .unwrap();

    let response = app(db).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn text_search_requires_a_query() {
    let request = Request::builder().uri("/api/search?q=%20").body(Body::empty()).unwrap();
    let response = app(empty_db()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_need_a_token() {
    let request = Request::builder().uri("/admin/drip/status").body(Body::empty()).unwrap();
    let response = app(empty_db()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_token_reaches_the_handler() {
    let token = mint_token("test-secret", "ops", Duration::from_secs(300)).unwrap();
    let request = Request::builder()
        .uri("/admin/drip/status")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    // No storefront credentials in the test config, so the drip is absent.
    let response = app(empty_db()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_components() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(empty_db()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["store"], true);
    assert_eq!(json["drive_auth"], Value::Null);
    assert_eq!(json["watching"], false);
}
