//! Checkout funnel analytics.
//!
//! Events are posted to `/analytics/track` on a background task. Delivery
//! failures are logged and dropped; tracking never blocks or fails a checkout.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use url::Url;
use veloura_core::{OrderId, Price, ProductId, SessionId, ShadeId};

use super::sandbox::LogAnalytics;
use super::{AnalyticsSink, ServiceError, build_http_client, endpoint, post_ack};
use crate::cart::CartLineItem;
use crate::checkout::CheckoutStep;

/// Product line attached to ecommerce events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventItem {
    pub item_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_variant: Option<ShadeId>,
    pub quantity: u32,
    pub price: Price,
}

impl From<&CartLineItem> for EventItem {
    fn from(line: &CartLineItem) -> Self {
        Self {
            item_id: line.product_id.clone(),
            item_variant: line.shade_id.clone(),
            quantity: line.quantity(),
            price: line.unit_price,
        }
    }
}

/// An event in the checkout funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "properties", rename_all = "snake_case")]
pub enum CheckoutEvent {
    BeginCheckout {
        session_id: SessionId,
        value: Price,
        items: Vec<EventItem>,
    },
    StepTransition {
        session_id: SessionId,
        from: CheckoutStep,
        to: CheckoutStep,
    },
    AddPaymentInfo {
        session_id: SessionId,
        value: Price,
        items: Vec<EventItem>,
    },
    PaymentFailed {
        session_id: SessionId,
        reason: String,
    },
    Purchase {
        session_id: SessionId,
        transaction_id: OrderId,
        value: Price,
        shipping: Price,
        tax: Price,
        items: Vec<EventItem>,
    },
    CheckoutCancelled {
        session_id: SessionId,
        step: CheckoutStep,
    },
}

impl CheckoutEvent {
    /// Event name as sent on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginCheckout { .. } => "begin_checkout",
            Self::StepTransition { .. } => "step_transition",
            Self::AddPaymentInfo { .. } => "add_payment_info",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::Purchase { .. } => "purchase",
            Self::CheckoutCancelled { .. } => "checkout_cancelled",
        }
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        match self {
            Self::BeginCheckout { session_id, .. }
            | Self::StepTransition { session_id, .. }
            | Self::AddPaymentInfo { session_id, .. }
            | Self::PaymentFailed { session_id, .. }
            | Self::Purchase { session_id, .. }
            | Self::CheckoutCancelled { session_id, .. } => session_id,
        }
    }
}

#[derive(Serialize)]
struct TrackRequest<'a> {
    #[serde(flatten)]
    event: &'a CheckoutEvent,
    timestamp: DateTime<Utc>,
}

/// HTTP analytics client.
#[derive(Clone)]
pub struct AnalyticsClient {
    client: reqwest::Client,
    url: String,
}

impl AnalyticsClient {
    /// Create a new analytics client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: &Url, api_key: Option<&SecretString>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(api_key)?,
            url: endpoint(base_url, "/analytics/track"),
        })
    }
}

impl AnalyticsSink for AnalyticsClient {
    fn track(&self, event: CheckoutEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = event.name(), "no runtime, analytics event dropped");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            let body = TrackRequest {
                event: &event,
                timestamp: Utc::now(),
            };
            if let Err(e) = post_ack(&client, &url, &body).await {
                tracing::warn!(
                    event = event.name(),
                    session_id = %event.session_id(),
                    error = %e,
                    "analytics delivery failed"
                );
            }
        });
    }
}

/// Analytics implementation chosen at startup.
#[derive(Clone)]
pub enum AnalyticsBackend {
    Http(AnalyticsClient),
    Log(LogAnalytics),
}

impl AnalyticsSink for AnalyticsBackend {
    fn track(&self, event: CheckoutEvent) {
        match self {
            Self::Http(client) => client.track(event),
            Self::Log(log) => log.track(event),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use veloura_core::CurrencyCode;

    use super::*;

    #[test]
    fn test_track_request_shape() {
        let event = CheckoutEvent::StepTransition {
            session_id: SessionId::new("s-1"),
            from: CheckoutStep::Shipping,
            to: CheckoutStep::Payment,
        };
        let body = TrackRequest {
            event: &event,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["event"], "step_transition");
        assert_eq!(json["properties"]["to"], "payment");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_event_name_matches_tag() {
        let event = CheckoutEvent::PaymentFailed {
            session_id: SessionId::new("s-1"),
            reason: "declined".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
    }

    #[test]
    fn test_event_item_from_line() {
        let line = CartLineItem::new(
            ProductId::new("ruby-velvet"),
            Some(ShadeId::new("deep")),
            2,
            Price::from_minor_units(2800, CurrencyCode::USD),
        )
        .unwrap();
        let item = EventItem::from(&line);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.item_variant, Some(ShadeId::new("deep")));
    }

    #[test]
    fn test_track_outside_runtime_does_not_panic() {
        let client = AnalyticsClient::new(&Url::parse("http://127.0.0.1:9").unwrap(), None).unwrap();
        client.track(CheckoutEvent::CheckoutCancelled {
            session_id: SessionId::new("s-1"),
            step: CheckoutStep::Review,
        });
    }
}
