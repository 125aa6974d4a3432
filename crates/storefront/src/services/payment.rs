//! Payment processor client.
//!
//! Amounts cross the wire as integer minor units (cents) with a lower-case
//! currency code. Responses are validated before they reach the checkout.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;
use veloura_core::{CurrencyCode, PaymentIntentId, PaymentStatus, Price};

use super::sandbox::SandboxPayments;
use super::{
    IntentMetadata, PaymentConfirmation, PaymentGateway, PaymentIntent, ServiceError, build_http_client,
    endpoint, post_ack, post_json,
};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct CreateIntentRequest<'a> {
    amount: i64,
    currency: &'static str,
    metadata: &'a IntentMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentResponse {
    id: PaymentIntentId,
    client_secret: String,
    amount: i64,
    currency: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest<'a> {
    client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    status: String,
    #[serde(default)]
    order_ref: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest<'a> {
    payment_intent_id: &'a str,
    amount: i64,
    reason: &'a str,
}

/// Convert a price to wire cents.
fn to_cents(price: Price) -> Result<i64, ServiceError> {
    price
        .to_minor_units()
        .ok_or_else(|| ServiceError::Malformed(format!("amount {price} out of range")))
}

impl IntentResponse {
    fn into_intent(self) -> Result<PaymentIntent, ServiceError> {
        if self.amount < 0 {
            return Err(ServiceError::Malformed(format!(
                "negative intent amount {}",
                self.amount
            )));
        }
        if self.client_secret.is_empty() {
            return Err(ServiceError::Malformed("intent without client secret".into()));
        }
        let currency = CurrencyCode::parse(&self.currency)
            .ok_or_else(|| ServiceError::Malformed(format!("unknown currency {}", self.currency)))?;
        Ok(PaymentIntent {
            id: self.id,
            client_secret: SecretString::from(self.client_secret),
            amount: Price::from_minor_units(self.amount, currency),
        })
    }
}

impl ConfirmResponse {
    fn into_confirmation(self) -> Result<PaymentConfirmation, ServiceError> {
        let status = PaymentStatus::parse(&self.status)
            .ok_or_else(|| ServiceError::Malformed(format!("unknown payment status {}", self.status)))?;
        Ok(PaymentConfirmation {
            status,
            payment_ref: self.order_ref,
            failure_reason: self.failure_code,
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the payment processor.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PaymentClient {
    /// Create a new payment client authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the client fails to build.
    pub fn new(base_url: Url, api_key: &SecretString) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(Some(api_key))?,
            base_url,
        })
    }
}

impl PaymentGateway for PaymentClient {
    #[instrument(skip(self, metadata), fields(amount = %amount))]
    async fn create_intent(&self, amount: Price, metadata: &IntentMetadata) -> Result<PaymentIntent, ServiceError> {
        let url = endpoint(&self.base_url, "/payments/create-intent");
        let body = CreateIntentRequest {
            amount: to_cents(amount)?,
            currency: amount.currency_code.wire_code(),
            metadata,
        };
        let response: IntentResponse = post_json(&self.client, &url, &body).await?;
        response.into_intent()
    }

    #[instrument(skip_all)]
    async fn confirm(&self, client_secret: &SecretString) -> Result<PaymentConfirmation, ServiceError> {
        let url = endpoint(&self.base_url, "/payments/confirm");
        let body = ConfirmRequest {
            client_secret: client_secret.expose_secret(),
        };
        let response: ConfirmResponse = post_json(&self.client, &url, &body).await?;
        response.into_confirmation()
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn refund(&self, payment_ref: &str, amount: Price, reason: &str) -> Result<(), ServiceError> {
        let url = endpoint(&self.base_url, "/payments/refund");
        let body = RefundRequest {
            payment_intent_id: payment_ref,
            amount: to_cents(amount)?,
            reason,
        };
        post_ack(&self.client, &url, &body).await
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Payment implementation chosen at startup.
#[derive(Clone)]
pub enum PaymentBackend {
    Http(PaymentClient),
    Sandbox(SandboxPayments),
}

impl PaymentGateway for PaymentBackend {
    async fn create_intent(&self, amount: Price, metadata: &IntentMetadata) -> Result<PaymentIntent, ServiceError> {
        match self {
            Self::Http(client) => client.create_intent(amount, metadata).await,
            Self::Sandbox(sandbox) => sandbox.create_intent(amount, metadata).await,
        }
    }

    async fn confirm(&self, client_secret: &SecretString) -> Result<PaymentConfirmation, ServiceError> {
        match self {
            Self::Http(client) => client.confirm(client_secret).await,
            Self::Sandbox(sandbox) => sandbox.confirm(client_secret).await,
        }
    }

    async fn refund(&self, payment_ref: &str, amount: Price, reason: &str) -> Result<(), ServiceError> {
        match self {
            Self::Http(client) => client.refund(payment_ref, amount, reason).await,
            Self::Sandbox(sandbox) => sandbox.refund(payment_ref, amount, reason).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_request_uses_cents() {
        let metadata = IntentMetadata::from([("session_id".to_string(), "s-1".to_string())]);
        let price = Price::from_minor_units(8400, CurrencyCode::USD);
        let body = CreateIntentRequest {
            amount: to_cents(price).unwrap(),
            currency: price.currency_code.wire_code(),
            metadata: &metadata,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], 8400);
        assert_eq!(json["currency"], "usd");
        assert_eq!(json["metadata"]["session_id"], "s-1");
    }

    #[test]
    fn test_intent_response_converts_back_to_major_units() {
        let response: IntentResponse = serde_json::from_str(
            r#"{"id":"pi_1","clientSecret":"pi_1_secret_x","amount":8400,"currency":"usd","status":"requires_confirmation"}"#,
        )
        .unwrap();
        let intent = response.into_intent().unwrap();
        assert_eq!(intent.amount, Price::from_minor_units(8400, CurrencyCode::USD));
        assert_eq!(intent.client_secret.expose_secret(), "pi_1_secret_x");
    }

    #[test]
    fn test_intent_response_rejects_negative_amount() {
        let response: IntentResponse =
            serde_json::from_str(r#"{"id":"pi_1","clientSecret":"s","amount":-1,"currency":"usd"}"#).unwrap();
        assert!(matches!(response.into_intent(), Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn test_confirm_response_statuses() {
        let declined: ConfirmResponse =
            serde_json::from_str(r#"{"status":"card_declined","failureCode":"insufficient_funds"}"#).unwrap();
        let confirmation = declined.into_confirmation().unwrap();
        assert_eq!(confirmation.status, PaymentStatus::Declined);
        assert_eq!(confirmation.failure_reason.as_deref(), Some("insufficient_funds"));

        let unknown: ConfirmResponse = serde_json::from_str(r#"{"status":"teleported"}"#).unwrap();
        assert!(matches!(unknown.into_confirmation(), Err(ServiceError::Malformed(_))));
    }
}
