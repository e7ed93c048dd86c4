//! Write-side client for the storefront's product catalog.

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::ShopifyConfig;
use crate::utils::retry::{is_transient_reqwest, Transient};

pub const CALL_LIMIT_HEADER: &str = "x-shopify-shop-api-call-limit";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("daily variant creation limit reached")]
    Throttled,
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("catalog returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected catalog response: {0}")]
    Malformed(String),
}

impl Transient for CatalogError {
    fn is_transient(&self) -> bool {
        matches!(self, CatalogError::Network(e) if is_transient_reqwest(e))
    }
}

/// The daily variant quota is only distinguishable by its message.
pub fn is_throttle_body(body: &str) -> bool {
    body.contains("variant creation limit") || body.contains("Daily variant")
}

/// `used/max` from the call-limit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLimit {
    pub used: u32,
    pub max: u32,
}

impl CallLimit {
    pub fn parse(raw: &str) -> Option<Self> {
        let (used, max) = raw.trim().split_once('/')?;
        Some(Self {
            used: used.trim().parse().ok()?,
            max: max.trim().parse().ok()?,
        })
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(CALL_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VariantInput {
    pub option1: String,
    pub price: String,
    pub compare_at_price: String,
    pub sku: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageInput {
    pub src: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductInput {
    pub title: String,
    pub body_html: String,
    pub vendor: String,
    pub product_type: String,
    /// Comma-separated, as the catalog expects.
    pub tags: String,
    pub options: Vec<serde_json::Value>,
    pub variants: Vec<VariantInput>,
    pub images: Vec<ImageInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedProduct {
    pub id: String,
    pub gid: Option<String>,
    pub call_limit: Option<CallLimit>,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn create_product(&self, product: &ProductInput) -> Result<CreatedProduct, CatalogError>;

    async fn update_tags(&self, product_id: &str, tags: &[String]) -> Result<Option<CallLimit>, CatalogError>;
}

#[derive(Deserialize)]
struct ProductEnvelope {
    product: ProductBody,
}

#[derive(Deserialize)]
struct ProductBody {
    id: i64,
    admin_graphql_api_id: Option<String>,
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| secs.ceil() as u64)
}

/// Maps a failed response onto the catalog's error kinds.
fn classify_failure(status: StatusCode, headers: &HeaderMap, body: String) -> CatalogError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if is_throttle_body(&body) {
            return CatalogError::Throttled;
        }
        return CatalogError::RateLimited {
            retry_after: retry_after(headers),
        };
    }
    CatalogError::Http {
        status: status.as_u16(),
        body: crate::utils::truncate_chars(&body, 500),
    }
}

pub struct ShopifyClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl ShopifyClient {
    pub fn new(config: &ShopifyConfig) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: format!(
                "https://{}/admin/api/{}",
                config.store_domain.trim_end_matches('/'),
                config.api_version
            ),
            access_token: config.access_token.clone(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(String, Option<CallLimit>), CatalogError> {
        let response = request
            .header("X-Shopify-Access-Token", &self.access_token)
            .send()
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status, &headers, body));
        }
        Ok((body, CallLimit::from_headers(&headers)))
    }
}

#[async_trait]
impl ProductCatalog for ShopifyClient {
    async fn create_product(&self, product: &ProductInput) -> Result<CreatedProduct, CatalogError> {
        let request = self
            .client
            .post(format!("{}/products.json", self.base_url))
            .json(&serde_json::json!({ "product": product }));
        let (body, call_limit) = self.send(request).await?;
        let envelope: ProductEnvelope =
            serde_json::from_str(&body).map_err(|e| CatalogError::Malformed(e.to_string()))?;
        Ok(CreatedProduct {
            id: envelope.product.id.to_string(),
            gid: envelope.product.admin_graphql_api_id,
            call_limit,
        })
    }

    async fn update_tags(&self, product_id: &str, tags: &[String]) -> Result<Option<CallLimit>, CatalogError> {
        let request = self
            .client
            .put(format!("{}/products/{}.json", self.base_url, product_id))
            .json(&serde_json::json!({
                "product": { "id": product_id.parse::<i64>().ok(), "tags": tags.join(", ") }
            }));
        let (_, call_limit) = self.send(request).await?;
        Ok(call_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn call_limit_header() {
        assert_eq!(CallLimit::parse("32/40"), Some(CallLimit { used: 32, max: 40 }));
        assert_eq!(CallLimit::parse(" 1 / 80 "), Some(CallLimit { used: 1, max: 80 }));
        assert_eq!(CallLimit::parse("garbage"), None);
    }

    #[test]
    fn quota_bodies_are_throttles() {
        let headers = HeaderMap::new();
        let daily = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            r#"{"errors":"Daily variant creation limit reached"}"#.into(),
        );
        assert!(matches!(daily, CatalogError::Throttled));

        let other = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            "You have exceeded the variant creation limit".into(),
        );
        assert!(matches!(other, CatalogError::Throttled));
    }

    #[test]
    fn plain_429_carries_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_static("2.0"));
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down".into());
        assert!(matches!(err, CatalogError::RateLimited { retry_after: Some(2) }));

        let err = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, &headers, "bad".into());
        assert!(matches!(err, CatalogError::Http { status: 422, .. }));
    }
}
