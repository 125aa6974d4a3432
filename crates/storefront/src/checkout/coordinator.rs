//! Reservation and payment coordinator.
//!
//! The only place that changes external inventory or payment state. Placing an
//! order runs three strictly ordered steps:
//!
//! 1. **Reserve** every snapshot line for the holder (all or nothing).
//! 2. **Confirm** the payment intent created for the checkout total.
//! 3. **Commit** the reservation and build the [`Order`].
//!
//! Every exit path leaves the ticket either `Committed` or `Released`. A
//! charge that cannot be matched with committed stock is refunded.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use veloura_core::{
    Address, HolderId, OrderId, PaymentIntentId, PaymentStatus, Price, ReservationStatus, SessionId,
    TicketId,
};

use super::clock::Clock;
use super::pricing::PricingBreakdown;
use super::snapshot::CartSnapshot;
use crate::cart::CartLineItem;
use crate::services::{
    IntentMetadata, InventoryService, PaymentGateway, PaymentIntent, ReleaseReason, ReservationLine,
    ReserveOutcome, ServiceError, UnavailableLine,
};

/// Which protocol step an external failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStage {
    Reserve,
    Payment,
    Commit,
}

impl std::fmt::Display for ProtocolStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reserve => "reserve",
            Self::Payment => "payment",
            Self::Commit => "commit",
        })
    }
}

/// A hold on inventory for one placement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationTicket {
    id: TicketId,
    items: Vec<ReservationLine>,
    holder: HolderId,
    status: ReservationStatus,
    expires_at: DateTime<Utc>,
}

impl ReservationTicket {
    #[must_use]
    pub const fn id(&self) -> &TicketId {
        &self.id
    }

    #[must_use]
    pub fn items(&self) -> &[ReservationLine] {
        &self.items
    }

    #[must_use]
    pub const fn holder(&self) -> &HolderId {
        &self.holder
    }

    #[must_use]
    pub const fn status(&self) -> ReservationStatus {
        self.status
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A ticket the inventory service has committed.
#[derive(Debug)]
pub struct CommittedTicket(ReservationTicket);

impl CommittedTicket {
    #[must_use]
    pub const fn ticket(&self) -> &ReservationTicket {
        &self.0
    }
}

/// A payment the processor reported as captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedPayment {
    intent_id: PaymentIntentId,
    payment_ref: String,
    amount: Price,
}

impl ConfirmedPayment {
    #[must_use]
    pub fn payment_ref(&self) -> &str {
        &self.payment_ref
    }

    #[must_use]
    pub const fn amount(&self) -> Price {
        self.amount
    }
}

/// A placed order.
///
/// Only the coordinator can build one, and only from a [`CommittedTicket`] and
/// a [`ConfirmedPayment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    session_id: SessionId,
    holder: HolderId,
    email: String,
    items: Vec<CartLineItem>,
    pricing: PricingBreakdown,
    shipping_address: Address,
    billing_address: Address,
    ticket_id: TicketId,
    payment_intent: PaymentIntentId,
    payment_ref: String,
    placed_at: DateTime<Utc>,
}

impl Order {
    fn assemble(
        committed: CommittedTicket,
        payment: ConfirmedPayment,
        request: &PlacementRequest<'_>,
        placed_at: DateTime<Utc>,
    ) -> Self {
        let CommittedTicket(ticket) = committed;
        Self {
            id: OrderId::generate(),
            session_id: request.session_id.clone(),
            holder: ticket.holder,
            email: request.email.to_owned(),
            items: request.snapshot.items().to_vec(),
            pricing: *request.pricing,
            shipping_address: request.shipping_address.clone(),
            billing_address: request.billing_address.clone(),
            ticket_id: ticket.id,
            payment_intent: payment.intent_id,
            payment_ref: payment.payment_ref,
            placed_at,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    #[must_use]
    pub const fn pricing(&self) -> &PricingBreakdown {
        &self.pricing
    }

    #[must_use]
    pub const fn ticket_id(&self) -> &TicketId {
        &self.ticket_id
    }

    #[must_use]
    pub fn payment_ref(&self) -> &str {
        &self.payment_ref
    }

    #[must_use]
    pub const fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }
}

/// Everything the coordinator needs from a session to place its order.
#[derive(Debug)]
pub struct PlacementRequest<'a> {
    pub session_id: &'a SessionId,
    pub holder: &'a HolderId,
    pub email: &'a str,
    pub snapshot: &'a CartSnapshot,
    pub pricing: &'a PricingBreakdown,
    pub intent: &'a PaymentIntent,
    pub shipping_address: &'a Address,
    pub billing_address: &'a Address,
}

/// Why an order could not be placed.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// One or more lines could not be reserved; nothing is held.
    #[error("{} item(s) unavailable", .0.len())]
    InventoryUnavailable(Vec<UnavailableLine>),

    /// The processor declined the charge; the reservation was released.
    #[error("payment {status:?}: {}", reason.as_deref().unwrap_or("no reason given"))]
    PaymentDeclined {
        status: PaymentStatus,
        reason: Option<String>,
        ticket: ReservationTicket,
    },

    /// An external service could not be reached; any hold was released.
    #[error("{stage} service unavailable: {source}")]
    ServiceUnavailable {
        stage: ProtocolStage,
        #[source]
        source: ServiceError,
        ticket: Option<ReservationTicket>,
    },

    /// The reservation lapsed before it could be committed.
    #[error("reservation {} expired", ticket.id)]
    ReservationExpired {
        ticket: ReservationTicket,
        refunded: bool,
    },

    /// Payment succeeded but the reservation could not be committed.
    #[error("commit of reservation {} failed: {source}", ticket.id)]
    CommitFailed {
        #[source]
        source: ServiceError,
        ticket: ReservationTicket,
        refunded: bool,
    },

    /// A protocol precondition did not hold.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl PlacementError {
    /// The ticket involved, if a reservation had been made.
    #[must_use]
    pub const fn ticket(&self) -> Option<&ReservationTicket> {
        match self {
            Self::PaymentDeclined { ticket, .. }
            | Self::ReservationExpired { ticket, .. }
            | Self::CommitFailed { ticket, .. } => Some(ticket),
            Self::ServiceUnavailable { ticket, .. } => ticket.as_ref(),
            Self::InventoryUnavailable(_) | Self::ContractViolation(_) => None,
        }
    }
}

/// Drives the reserve, confirm and commit protocol.
pub struct ReservationCoordinator<I, P> {
    inventory: I,
    payments: P,
    clock: Arc<dyn Clock>,
    reservation_ttl: Duration,
}

impl<I: InventoryService, P: PaymentGateway> ReservationCoordinator<I, P> {
    #[must_use]
    pub fn new(inventory: I, payments: P, clock: Arc<dyn Clock>, reservation_ttl: Duration) -> Self {
        Self {
            inventory,
            payments,
            clock,
            reservation_ttl,
        }
    }

    /// Create a payment intent for `amount`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the processor call fails or the intent it
    /// returns is for a different amount.
    #[instrument(skip(self, metadata), fields(amount = %amount))]
    pub async fn prepare_payment(
        &self,
        amount: Price,
        metadata: &IntentMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        let intent = self.payments.create_intent(amount, metadata).await?;
        if intent.amount != amount {
            return Err(ServiceError::Malformed(format!(
                "intent {} is for {} but {} was requested",
                intent.id, intent.amount, amount
            )));
        }
        Ok(intent)
    }

    /// Run the full placement protocol.
    ///
    /// # Errors
    ///
    /// Returns a [`PlacementError`] describing the step that failed. No ticket
    /// is left `Reserved` when this returns.
    #[instrument(skip_all, fields(session_id = %request.session_id, holder = %request.holder))]
    pub async fn place_order(&self, request: &PlacementRequest<'_>) -> Result<Order, PlacementError> {
        if request.intent.amount != request.pricing.total() {
            return Err(PlacementError::ContractViolation(format!(
                "intent amount {} does not match total {}",
                request.intent.amount,
                request.pricing.total()
            )));
        }

        let ticket = self.reserve(request).await?;
        let (ticket, payment) = self.confirm(ticket, request.intent).await?;
        let committed = self.commit(ticket, &payment).await?;

        let order = Order::assemble(committed, payment, request, self.clock.now());
        tracing::info!(order_id = %order.id, total = %order.pricing.total(), "order placed");
        Ok(order)
    }

    async fn reserve(&self, request: &PlacementRequest<'_>) -> Result<ReservationTicket, PlacementError> {
        let items = request.snapshot.reservation_lines();
        match self.inventory.reserve(&items, request.holder).await {
            Ok(ReserveOutcome::Reserved { ticket_id, expires_at }) => {
                let local_expiry = self.clock.now() + self.reservation_ttl;
                let expires_at = expires_at.map_or(local_expiry, |remote| remote.min(local_expiry));
                tracing::debug!(ticket_id = %ticket_id, %expires_at, "stock reserved");
                Ok(ReservationTicket {
                    id: ticket_id,
                    items,
                    holder: request.holder.clone(),
                    status: ReservationStatus::Reserved,
                    expires_at,
                })
            }
            Ok(ReserveOutcome::Rejected { unavailable }) => {
                tracing::info!(lines = unavailable.len(), "reservation rejected");
                Err(PlacementError::InventoryUnavailable(unavailable))
            }
            Err(source) => {
                // The hold may or may not exist on the other side.
                if let Err(e) = self
                    .inventory
                    .release(&items, request.holder, None, ReleaseReason::ReservationError)
                    .await
                {
                    tracing::warn!(error = %e, "release after failed reserve also failed");
                }
                Err(PlacementError::ServiceUnavailable {
                    stage: ProtocolStage::Reserve,
                    source,
                    ticket: None,
                })
            }
        }
    }

    async fn confirm(
        &self,
        mut ticket: ReservationTicket,
        intent: &PaymentIntent,
    ) -> Result<(ReservationTicket, ConfirmedPayment), PlacementError> {
        if ticket.is_expired(self.clock.now()) {
            self.release(&mut ticket, ReleaseReason::ReservationExpired).await;
            return Err(PlacementError::ReservationExpired {
                ticket,
                refunded: false,
            });
        }

        match self.payments.confirm(&intent.client_secret).await {
            Ok(confirmation) if confirmation.status.is_success() => {
                let payment_ref = confirmation
                    .payment_ref
                    .unwrap_or_else(|| intent.id.to_string());
                Ok((
                    ticket,
                    ConfirmedPayment {
                        intent_id: intent.id.clone(),
                        payment_ref,
                        amount: intent.amount,
                    },
                ))
            }
            Ok(confirmation) => {
                tracing::info!(status = ?confirmation.status, "payment not captured");
                self.release(&mut ticket, ReleaseReason::PaymentDeclined).await;
                Err(PlacementError::PaymentDeclined {
                    status: confirmation.status,
                    reason: confirmation.failure_reason,
                    ticket,
                })
            }
            Err(source) => {
                self.release(&mut ticket, ReleaseReason::PaymentError).await;
                Err(PlacementError::ServiceUnavailable {
                    stage: ProtocolStage::Payment,
                    source,
                    ticket: Some(ticket),
                })
            }
        }
    }

    async fn commit(
        &self,
        mut ticket: ReservationTicket,
        payment: &ConfirmedPayment,
    ) -> Result<CommittedTicket, PlacementError> {
        if ticket.status != ReservationStatus::Reserved {
            return Err(PlacementError::ContractViolation(format!(
                "commit of ticket {} in state {:?}",
                ticket.id, ticket.status
            )));
        }

        if ticket.is_expired(self.clock.now()) {
            let refunded = self.refund(payment, "reservation_expired").await;
            self.release(&mut ticket, ReleaseReason::ReservationExpired).await;
            return Err(PlacementError::ReservationExpired { ticket, refunded });
        }

        match self.inventory.commit(&ticket.id).await {
            Ok(()) => {
                ticket.status = ReservationStatus::Committed;
                Ok(CommittedTicket(ticket))
            }
            Err(source) => {
                tracing::error!(ticket_id = %ticket.id, error = %source, "commit failed after payment");
                let refunded = self.refund(payment, "commit_failed").await;
                self.release(&mut ticket, ReleaseReason::CommitFailed).await;
                Err(PlacementError::CommitFailed {
                    source,
                    ticket,
                    refunded,
                })
            }
        }
    }

    /// Release a ticket. A failed call is logged and left to the external
    /// reaper; the ticket is marked released either way.
    async fn release(&self, ticket: &mut ReservationTicket, reason: ReleaseReason) {
        if let Err(e) = self
            .inventory
            .release(&ticket.items, &ticket.holder, Some(&ticket.id), reason)
            .await
        {
            tracing::error!(
                ticket_id = %ticket.id,
                reason = reason.as_str(),
                error = %e,
                "reservation release failed"
            );
        }
        ticket.status = ReservationStatus::Released;
    }

    async fn refund(&self, payment: &ConfirmedPayment, reason: &str) -> bool {
        match self
            .payments
            .refund(&payment.payment_ref, payment.amount, reason)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    payment_ref = %payment.payment_ref,
                    amount = %payment.amount,
                    error = %e,
                    "refund failed, manual intervention required"
                );
                false
            }
        }
    }
}
