//! External collaborators of the checkout.
//!
//! # Services
//!
//! - `inventory` - Stock reservation API (reserve / release / commit)
//! - `payment` - Payment processor API (intents, confirmation, refunds)
//! - `shipping` - Shipping rate and sales tax API
//! - `analytics` - Fire-and-forget checkout funnel events
//! - `sandbox` - In-process implementations of all of the above
//!
//! Each collaborator is described by a trait so the checkout can be driven by
//! either the HTTP clients or the sandbox. The `*Backend` enums pick one at
//! startup from configuration.
//!
//! Inventory counts, payment state and tax rules are owned by the external
//! services; nothing here caches stock levels.

pub mod analytics;
pub mod inventory;
pub mod payment;
pub mod sandbox;
pub mod shipping;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use veloura_core::{
    Address, HolderId, PaymentIntentId, PaymentStatus, Price, ProductId, ShadeId, ShippingRateId,
    TicketId,
};

pub use analytics::{AnalyticsBackend, AnalyticsClient, CheckoutEvent, EventItem};
pub use inventory::{InventoryBackend, InventoryClient};
pub use payment::{PaymentBackend, PaymentClient};
pub use shipping::{ShippingBackend, ShippingClient};

/// Timeout applied to every outbound API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that can occur when calling an external service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The response could not be decoded or failed validation.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

// =============================================================================
// Inventory
// =============================================================================

/// One line of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shade_id: Option<ShadeId>,
    pub quantity: u32,
}

/// A line the inventory service could not reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableLine {
    pub product_id: ProductId,
    pub shade_id: Option<ShadeId>,
    pub requested: u32,
    pub reason: String,
}

/// Result of a reservation attempt.
///
/// Reservations are all-or-nothing: a `Rejected` outcome means no stock is
/// held for any of the requested lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved {
        ticket_id: TicketId,
        /// Expiry reported by the service, if any.
        expires_at: Option<DateTime<Utc>>,
    },
    Rejected {
        unavailable: Vec<UnavailableLine>,
    },
}

/// Why a reservation is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    PaymentDeclined,
    PaymentError,
    ReservationError,
    ReservationExpired,
    CommitFailed,
}

impl ReleaseReason {
    /// Wire value sent to the inventory service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentDeclined => "payment_declined",
            Self::PaymentError => "payment_error",
            Self::ReservationError => "reservation_error",
            Self::ReservationExpired => "reservation_expired",
            Self::CommitFailed => "commit_failed",
        }
    }
}

/// Stock reservation API.
pub trait InventoryService: Send + Sync + 'static {
    /// Reserve every line for `holder`, or nothing at all.
    fn reserve(
        &self,
        items: &[ReservationLine],
        holder: &HolderId,
    ) -> impl Future<Output = Result<ReserveOutcome, ServiceError>> + Send;

    /// Return held stock to the available pool.
    ///
    /// With a ticket only that hold is released. Without one (the reserve
    /// call failed in transit) the hold is matched by holder and lines.
    fn release(
        &self,
        items: &[ReservationLine],
        holder: &HolderId,
        ticket_id: Option<&TicketId>,
        reason: ReleaseReason,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Convert a held reservation into sold stock.
    fn commit(&self, ticket_id: &TicketId) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

// =============================================================================
// Payments
// =============================================================================

/// A payment intent created for the checkout total.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    /// Secret handed to the browser to confirm the intent.
    pub client_secret: SecretString,
    pub amount: Price,
}

/// Processor response to confirming an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub status: PaymentStatus,
    /// Processor reference for the captured charge (present on success).
    pub payment_ref: Option<String>,
    /// Decline or failure code reported by the processor.
    pub failure_reason: Option<String>,
}

/// Free-form metadata attached to a payment intent.
pub type IntentMetadata = BTreeMap<String, String>;

/// Intent metadata key carrying the selected payment method.
pub const PAYMENT_METHOD_KEY: &str = "payment_method";

/// Payment processor API.
pub trait PaymentGateway: Send + Sync + 'static {
    /// Create an intent to charge `amount`.
    fn create_intent(
        &self,
        amount: Price,
        metadata: &IntentMetadata,
    ) -> impl Future<Output = Result<PaymentIntent, ServiceError>> + Send;

    /// Confirm a previously created intent.
    fn confirm(
        &self,
        client_secret: &SecretString,
    ) -> impl Future<Output = Result<PaymentConfirmation, ServiceError>> + Send;

    /// Refund a captured charge.
    fn refund(
        &self,
        payment_ref: &str,
        amount: Price,
        reason: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

// =============================================================================
// Shipping & tax
// =============================================================================

/// Unit of a delivery estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaUnit {
    Day,
    Week,
}

/// Delivery time range for a shipping rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub min: u32,
    pub max: u32,
    pub unit: EtaUnit,
}

/// A shipping option offered for an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRate {
    pub id: ShippingRateId,
    pub display_name: String,
    pub amount: Price,
    pub eta: DeliveryEstimate,
}

/// Shipping rate and sales tax API.
pub trait ShippingTaxService: Send + Sync + 'static {
    /// Shipping options available for `address`.
    fn rates(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Vec<ShippingRate>, ServiceError>> + Send;

    /// Sales tax due on `taxable` when shipping to `address`.
    fn tax(
        &self,
        address: &Address,
        taxable: Price,
    ) -> impl Future<Output = Result<Price, ServiceError>> + Send;
}

// =============================================================================
// Analytics
// =============================================================================

/// Checkout funnel event sink.
///
/// `track` must return immediately; delivery failures are logged and dropped.
pub trait AnalyticsSink: Send + Sync + 'static {
    fn track(&self, event: CheckoutEvent);
}

// =============================================================================
// HTTP helpers
// =============================================================================

/// Build a JSON API client with an optional bearer token.
///
/// # Errors
///
/// Returns error if the token is not a valid header value or the client fails to build.
pub(crate) fn build_http_client(api_key: Option<&SecretString>) -> Result<reqwest::Client, ServiceError> {
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));

    if let Some(key) = api_key {
        let auth_value = format!("Bearer {}", key.expose_secret());
        let mut value = HeaderValue::from_str(&auth_value)
            .map_err(|e| ServiceError::Malformed(format!("Invalid API key format: {e}")))?;
        value.set_sensitive(true);
        headers.insert("Authorization", value);
    }

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// POST a JSON body and decode a JSON response.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<R, ServiceError>
where
    B: Serialize + Sync,
    R: DeserializeOwned,
{
    let response = send_json(client, url, body).await?;
    response
        .json::<R>()
        .await
        .map_err(|e| ServiceError::Malformed(e.to_string()))
}

/// POST a JSON body, expecting only a success status.
pub(crate) async fn post_ack<B>(client: &reqwest::Client, url: &str, body: &B) -> Result<(), ServiceError>
where
    B: Serialize + Sync,
{
    send_json(client, url, body).await.map(|_| ())
}

async fn send_json<B>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<reqwest::Response, ServiceError>
where
    B: Serialize + Sync,
{
    let response = client.post(url).json(body).send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ServiceError::RateLimited(retry_after));
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ServiceError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// Join a configured base URL and an endpoint path.
pub(crate) fn endpoint(base: &url::Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_release_reason_wire_values() {
        assert_eq!(ReleaseReason::PaymentDeclined.as_str(), "payment_declined");
        assert_eq!(ReleaseReason::CommitFailed.as_str(), "commit_failed");
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let base = url::Url::parse("https://api.example.com/v1/").unwrap();
        assert_eq!(endpoint(&base, "/inventory/reserve"), "https://api.example.com/v1/inventory/reserve");
    }

    #[test]
    fn test_reservation_line_omits_missing_shade() {
        let line = ReservationLine {
            product_id: ProductId::new("golden-hour"),
            shade_id: None,
            quantity: 1,
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json, serde_json::json!({"productId": "golden-hour", "quantity": 1}));
    }
}
