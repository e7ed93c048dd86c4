//! Print-fulfillment provider client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

use crate::utils::retry::{is_transient_reqwest, is_transient_status, Transient};

pub const API_BASE: &str = "https://api.printful.com";

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("fulfillment provider returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected fulfillment response: {0}")]
    Malformed(String),
    #[error("no fulfillment variant for size {0}")]
    UnknownVariant(String),
}

impl Transient for FulfillmentError {
    fn is_transient(&self) -> bool {
        match self {
            FulfillmentError::Network(e) => is_transient_reqwest(e),
            FulfillmentError::Http { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Recipient {
    pub name: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub country_code: String,
    pub zip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintFile {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub variant_id: i64,
    pub quantity: u32,
    pub files: Vec<PrintFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub external_id: String,
    pub recipient: Recipient,
    pub items: Vec<OrderItem>,
}

impl OrderRequest {
    /// One print of one image.
    pub fn single(external_id: impl Into<String>, recipient: Recipient, variant_id: i64, quantity: u32, image_url: &str) -> Self {
        Self {
            external_id: external_id.into(),
            recipient,
            items: vec![OrderItem {
                variant_id,
                quantity: quantity.max(1),
                files: vec![PrintFile {
                    url: image_url.to_string(),
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ProviderOrder {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct CostEstimate {
    pub currency: String,
    pub subtotal: String,
    pub shipping: String,
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ShippingRate {
    pub id: String,
    pub name: String,
    pub rate: String,
    pub currency: String,
}

#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    /// Creates a draft order; `confirm` submits it for production at once.
    async fn create_order(&self, order: &OrderRequest, confirm: bool) -> Result<ProviderOrder, FulfillmentError>;
    async fn confirm_order(&self, order_id: i64) -> Result<ProviderOrder, FulfillmentError>;
    async fn list_orders(&self, offset: u64, limit: u64) -> Result<Vec<ProviderOrder>, FulfillmentError>;
    async fn estimate_cost(&self, order: &OrderRequest) -> Result<CostEstimate, FulfillmentError>;
    async fn shipping_rates(&self, recipient: &Recipient, items: &[OrderItem]) -> Result<Vec<ShippingRate>, FulfillmentError>;
}

/// The provider wraps every payload as `{code, result}` or `{code, error}`.
#[derive(Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    code: u16,
    result: Option<T>,
    error: Option<EnvelopeError>,
}

#[derive(Deserialize)]
struct EnvelopeError {
    message: String,
}

#[derive(Deserialize)]
struct EstimateResult {
    costs: RawCosts,
}

#[derive(Deserialize)]
struct RawCosts {
    currency: String,
    subtotal: serde_json::Value,
    shipping: serde_json::Value,
    total: serde_json::Value,
}

fn money(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn unwrap_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, FulfillmentError> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(e) if (200..300).contains(&status) => return Err(FulfillmentError::Malformed(e.to_string())),
        Err(_) => {
            return Err(FulfillmentError::Http {
                status,
                message: crate::utils::truncate_chars(body, 500),
            })
        }
    };
    if !(200..300).contains(&status) {
        let message = envelope
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| crate::utils::truncate_chars(body, 500));
        return Err(FulfillmentError::Http { status, message });
    }
    envelope
        .result
        .ok_or_else(|| FulfillmentError::Malformed("missing result".to_string()))
}

pub struct PrintfulClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PrintfulClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, FulfillmentError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: API_BASE.to_string(),
            api_key: api_key.into(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, FulfillmentError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        unwrap_envelope(status, &body)
    }
}

#[async_trait]
impl FulfillmentProvider for PrintfulClient {
    async fn create_order(&self, order: &OrderRequest, confirm: bool) -> Result<ProviderOrder, FulfillmentError> {
        let request = self
            .client
            .post(format!("{}/orders", self.base_url))
            .query(&[("confirm", confirm)])
            .json(order);
        self.call(request).await
    }

    async fn confirm_order(&self, order_id: i64) -> Result<ProviderOrder, FulfillmentError> {
        let request = self
            .client
            .post(format!("{}/orders/{}/confirm", self.base_url, order_id));
        self.call(request).await
    }

    async fn list_orders(&self, offset: u64, limit: u64) -> Result<Vec<ProviderOrder>, FulfillmentError> {
        let request = self
            .client
            .get(format!("{}/orders", self.base_url))
            .query(&[("offset", offset), ("limit", limit.clamp(1, 100))]);
        self.call(request).await
    }

    async fn estimate_cost(&self, order: &OrderRequest) -> Result<CostEstimate, FulfillmentError> {
        let request = self
            .client
            .post(format!("{}/orders/estimate-costs", self.base_url))
            .json(order);
        let result: EstimateResult = self.call(request).await?;
        Ok(CostEstimate {
            currency: result.costs.currency,
            subtotal: money(result.costs.subtotal),
            shipping: money(result.costs.shipping),
            total: money(result.costs.total),
        })
    }

    async fn shipping_rates(&self, recipient: &Recipient, items: &[OrderItem]) -> Result<Vec<ShippingRate>, FulfillmentError> {
        let request = self
            .client
            .post(format!("{}/shipping/rates", self.base_url))
            .json(&serde_json::json!({
                "recipient": recipient,
                "items": items
                    .iter()
                    .map(|i| serde_json::json!({ "variant_id": i.variant_id, "quantity": i.quantity }))
                    .collect::<Vec<_>>(),
            }));
        self.call(request).await
    }
}

/// Maps a storefront shipping address onto the provider's recipient shape.
pub fn recipient_from_address(address: &serde_json::Value, email: Option<&str>) -> Option<Recipient> {
    let field = |key: &str| {
        address
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let name = field("name").or_else(|| {
        let joined = [field("first_name"), field("last_name")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    })?;
    Some(Recipient {
        name,
        address1: field("address1")?,
        address2: field("address2"),
        city: field("city")?,
        state_code: field("province_code"),
        country_code: field("country_code")?,
        zip: field("zip")?,
        phone: field("phone"),
        email: email.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_yields_result_or_error() {
        let order: ProviderOrder =
            unwrap_envelope(200, r#"{"code":200,"result":{"id":77,"status":"draft","external_id":"1001-5"}}"#).unwrap();
        assert_eq!(order.id, 77);
        assert_eq!(order.external_id.as_deref(), Some("1001-5"));

        let err = unwrap_envelope::<ProviderOrder>(400, r#"{"code":400,"error":{"message":"Invalid variant"}}"#).unwrap_err();
        assert!(matches!(err, FulfillmentError::Http { status: 400, ref message } if message == "Invalid variant"));
        assert!(!err.is_transient());

        let err = unwrap_envelope::<ProviderOrder>(503, "<html>down</html>").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn storefront_address_becomes_recipient() {
        let address = json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "address1": "12 St James's Square",
            "address2": "",
            "city": "London",
            "province_code": null,
            "country_code": "GB",
            "zip": "SW1Y 4JH"
        });
        let r = recipient_from_address(&address, Some("ada@example.com")).unwrap();
        assert_eq!(r.name, "Ada Lovelace");
        assert_eq!(r.address2, None);
        assert_eq!(r.country_code, "GB");
        assert_eq!(r.email.as_deref(), Some("ada@example.com"));

        assert!(recipient_from_address(&json!({"name": "No Street"}), None).is_none());
    }

    #[test]
    fn single_item_orders_carry_the_image() {
        let order = OrderRequest::single("1001-5", Recipient::default(), 101, 0, "https://img/x=w2000");
        assert_eq!(order.items[0].quantity, 1);
        assert_eq!(order.items[0].files[0].url, "https://img/x=w2000");
    }
}
