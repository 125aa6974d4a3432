//! Inventory API client.
//!
//! # Endpoints
//!
//! - `POST /inventory/reserve` - all-or-nothing hold on stock for a holder
//! - `POST /inventory/release` - return held stock
//! - `POST /inventory/commit` - convert a hold into sold stock

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;
use veloura_core::{HolderId, ProductId, ShadeId, TicketId};

use super::sandbox::SandboxInventory;
use super::{
    InventoryService, ReleaseReason, ReservationLine, ReserveOutcome, ServiceError, UnavailableLine,
    build_http_client, endpoint, post_ack, post_json,
};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReserveRequest<'a> {
    items: &'a [ReservationLine],
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReserveResponse {
    success: bool,
    #[serde(default)]
    ticket_id: Option<TicketId>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reservations: Vec<LineResult>,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineResult {
    product_id: ProductId,
    #[serde(default)]
    shade_id: Option<ShadeId>,
    quantity: u32,
    reserved: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseRequest<'a> {
    items: &'a [ReservationLine],
    user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ticket_id: Option<&'a TicketId>,
    reason: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest<'a> {
    ticket_id: &'a TicketId,
}

impl ReserveResponse {
    /// Validate the response into a [`ReserveOutcome`].
    fn into_outcome(self, requested: &[ReservationLine]) -> Result<ReserveOutcome, ServiceError> {
        if self.success {
            let ticket_id = self
                .ticket_id
                .ok_or_else(|| ServiceError::Malformed("reservation succeeded without a ticket id".into()))?;
            if self.reservations.iter().any(|line| !line.reserved) {
                return Err(ServiceError::Malformed(
                    "reservation succeeded with unreserved lines".into(),
                ));
            }
            return Ok(ReserveOutcome::Reserved {
                ticket_id,
                expires_at: self.expires_at,
            });
        }

        let mut unavailable: Vec<UnavailableLine> = self
            .reservations
            .into_iter()
            .filter(|line| !line.reserved)
            .map(|line| UnavailableLine {
                product_id: line.product_id,
                shade_id: line.shade_id,
                requested: line.quantity,
                reason: line.reason.unwrap_or_else(|| "insufficient stock".to_string()),
            })
            .collect();

        // The service may only give a top-level reason; attribute it to every line.
        if unavailable.is_empty() {
            let reason = self
                .failure_reason
                .unwrap_or_else(|| "insufficient stock".to_string());
            unavailable = requested
                .iter()
                .map(|line| UnavailableLine {
                    product_id: line.product_id.clone(),
                    shade_id: line.shade_id.clone(),
                    requested: line.quantity,
                    reason: reason.clone(),
                })
                .collect();
        }

        Ok(ReserveOutcome::Rejected { unavailable })
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the inventory API.
#[derive(Clone)]
pub struct InventoryClient {
    client: reqwest::Client,
    base_url: Url,
}

impl InventoryClient {
    /// Create a new inventory client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url, api_key: Option<&SecretString>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(api_key)?,
            base_url,
        })
    }
}

impl InventoryService for InventoryClient {
    #[instrument(skip(self, items), fields(holder = %holder, lines = items.len()))]
    async fn reserve(&self, items: &[ReservationLine], holder: &HolderId) -> Result<ReserveOutcome, ServiceError> {
        let url = endpoint(&self.base_url, "/inventory/reserve");
        let body = ReserveRequest {
            items,
            user_id: holder.wire_value(),
        };
        let response: ReserveResponse = post_json(&self.client, &url, &body).await?;
        response.into_outcome(items)
    }

    #[instrument(skip(self, items), fields(holder = %holder, ticket_id = ?ticket_id, reason = reason.as_str()))]
    async fn release(
        &self,
        items: &[ReservationLine],
        holder: &HolderId,
        ticket_id: Option<&TicketId>,
        reason: ReleaseReason,
    ) -> Result<(), ServiceError> {
        let url = endpoint(&self.base_url, "/inventory/release");
        let body = ReleaseRequest {
            items,
            user_id: holder.wire_value(),
            ticket_id,
            reason: reason.as_str(),
        };
        post_ack(&self.client, &url, &body).await
    }

    #[instrument(skip(self), fields(ticket_id = %ticket_id))]
    async fn commit(&self, ticket_id: &TicketId) -> Result<(), ServiceError> {
        let url = endpoint(&self.base_url, "/inventory/commit");
        post_ack(&self.client, &url, &CommitRequest { ticket_id }).await
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Inventory implementation chosen at startup.
#[derive(Clone)]
pub enum InventoryBackend {
    Http(InventoryClient),
    Sandbox(SandboxInventory),
}

impl InventoryService for InventoryBackend {
    async fn reserve(&self, items: &[ReservationLine], holder: &HolderId) -> Result<ReserveOutcome, ServiceError> {
        match self {
            Self::Http(client) => client.reserve(items, holder).await,
            Self::Sandbox(sandbox) => sandbox.reserve(items, holder).await,
        }
    }

    async fn release(
        &self,
        items: &[ReservationLine],
        holder: &HolderId,
        ticket_id: Option<&TicketId>,
        reason: ReleaseReason,
    ) -> Result<(), ServiceError> {
        match self {
            Self::Http(client) => client.release(items, holder, ticket_id, reason).await,
            Self::Sandbox(sandbox) => sandbox.release(items, holder, ticket_id, reason).await,
        }
    }

    async fn commit(&self, ticket_id: &TicketId) -> Result<(), ServiceError> {
        match self {
            Self::Http(client) => client.commit(ticket_id).await,
            Self::Sandbox(sandbox) => sandbox.commit(ticket_id).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn requested() -> Vec<ReservationLine> {
        vec![
            ReservationLine {
                product_id: ProductId::new("ruby-velvet"),
                shade_id: None,
                quantity: 2,
            },
            ReservationLine {
                product_id: ProductId::new("golden-hour"),
                shade_id: None,
                quantity: 1,
            },
        ]
    }

    fn parse(json: &str) -> Result<ReserveOutcome, ServiceError> {
        serde_json::from_str::<ReserveResponse>(json)
            .unwrap()
            .into_outcome(&requested())
    }

    #[test]
    fn test_reserve_request_shape() {
        let items = requested();
        let body = ReserveRequest {
            items: &items,
            user_id: HolderId::Guest(veloura_core::SessionId::new("s-1")).wire_value(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["userId"], "guest:s-1");
        assert_eq!(json["items"][0]["productId"], "ruby-velvet");
        assert_eq!(json["items"][0]["quantity"], 2);
    }

    #[test]
    fn test_release_request_names_ticket() {
        let items = requested();
        let ticket = TicketId::new("T1");
        let holder = HolderId::Guest(veloura_core::SessionId::new("s-1"));

        let body = ReleaseRequest {
            items: &items,
            user_id: holder.wire_value(),
            ticket_id: Some(&ticket),
            reason: ReleaseReason::PaymentDeclined.as_str(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ticketId"], "T1");
        assert_eq!(json["reason"], "payment_declined");

        let body = ReleaseRequest {
            ticket_id: None,
            ..body
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("ticketId").is_none());
        assert_eq!(json["userId"], "guest:s-1");
    }

    #[test]
    fn test_successful_reservation() {
        let outcome = parse(
            r#"{"success":true,"ticketId":"T1","expiresAt":"2026-01-01T00:15:00Z",
               "reservations":[{"productId":"ruby-velvet","quantity":2,"reserved":true}]}"#,
        )
        .unwrap();
        let ReserveOutcome::Reserved { ticket_id, expires_at } = outcome else {
            panic!("expected reservation");
        };
        assert_eq!(ticket_id.as_str(), "T1");
        assert!(expires_at.is_some());
    }

    #[test]
    fn test_success_without_ticket_is_malformed() {
        assert!(matches!(parse(r#"{"success":true}"#), Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn test_rejection_lists_short_lines() {
        let outcome = parse(
            r#"{"success":false,"reservations":[
                {"productId":"ruby-velvet","quantity":2,"reserved":true},
                {"productId":"golden-hour","quantity":1,"reserved":false,"reason":"out_of_stock"}]}"#,
        )
        .unwrap();
        let ReserveOutcome::Rejected { unavailable } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].product_id.as_str(), "golden-hour");
        assert_eq!(unavailable[0].reason, "out_of_stock");
    }

    #[test]
    fn test_rejection_without_line_detail() {
        let outcome = parse(r#"{"success":false,"failureReason":"warehouse offline"}"#).unwrap();
        let ReserveOutcome::Rejected { unavailable } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(unavailable.len(), 2);
        assert!(unavailable.iter().all(|l| l.reason == "warehouse offline"));
    }
}
