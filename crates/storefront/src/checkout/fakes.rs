//! Scripted collaborators for checkout unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use secrecy::SecretString;
use veloura_core::{Address, CurrencyCode, PaymentIntentId, PaymentStatus, Price, ShippingRateId, TicketId};

use super::clock::ManualClock;
use crate::services::{
    AnalyticsSink, CheckoutEvent, DeliveryEstimate, EtaUnit, IntentMetadata, InventoryService,
    PaymentConfirmation, PaymentGateway, PaymentIntent, ReleaseReason, ReservationLine, ReserveOutcome,
    ServiceError, ShippingRate, ShippingTaxService, UnavailableLine,
};

fn outage() -> ServiceError {
    ServiceError::Api {
        status: 503,
        message: "service unavailable".into(),
    }
}

// =============================================================================
// Shipping
// =============================================================================

#[derive(Default)]
struct ShippingLog {
    rate_calls: usize,
    taxed: Vec<Price>,
}

#[derive(Clone, Default)]
pub struct FakeShipping {
    tax_rate: Decimal,
    fail_rates: bool,
    fail_tax: bool,
    log: Arc<Mutex<ShippingLog>>,
}

impl FakeShipping {
    pub fn with_tax_rate(mut self, rate: Decimal) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn failing_tax(mut self) -> Self {
        self.fail_tax = true;
        self
    }

    pub fn failing_rates(mut self) -> Self {
        self.fail_rates = true;
        self
    }

    pub fn rate_calls(&self) -> usize {
        self.log.lock().unwrap().rate_calls
    }

    pub fn taxed_amounts(&self) -> Vec<Price> {
        self.log.lock().unwrap().taxed.clone()
    }
}

fn rate(id: &str, cents: i64) -> ShippingRate {
    ShippingRate {
        id: ShippingRateId::new(id),
        display_name: id.to_string(),
        amount: Price::from_minor_units(cents, CurrencyCode::USD),
        eta: DeliveryEstimate {
            min: 1,
            max: 7,
            unit: EtaUnit::Day,
        },
    }
}

impl ShippingTaxService for FakeShipping {
    async fn rates(&self, _address: &Address) -> Result<Vec<ShippingRate>, ServiceError> {
        self.log.lock().unwrap().rate_calls += 1;
        if self.fail_rates {
            return Err(outage());
        }
        Ok(vec![rate("standard", 0), rate("express", 1000), rate("overnight", 2500)])
    }

    async fn tax(&self, _address: &Address, taxable: Price) -> Result<Price, ServiceError> {
        self.log.lock().unwrap().taxed.push(taxable);
        if self.fail_tax {
            return Err(outage());
        }
        Ok(Price::new(taxable.amount * self.tax_rate, taxable.currency_code))
    }
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCall {
    Reserve,
    Release(ReleaseReason),
    Commit(TicketId),
}

#[derive(Default)]
struct InventoryState {
    calls: Vec<InventoryCall>,
    released: Vec<Option<TicketId>>,
    next_ticket: u64,
}

#[derive(Clone, Default)]
pub struct FakeInventory {
    reject: Option<String>,
    unreachable_reserve: bool,
    fail_commit: bool,
    state: Arc<Mutex<InventoryState>>,
}

impl FakeInventory {
    /// Reject any reservation that includes `product`.
    pub fn rejecting(mut self, product: &str) -> Self {
        self.reject = Some(product.to_string());
        self
    }

    pub fn unreachable_reserve(mut self) -> Self {
        self.unreachable_reserve = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn calls(&self) -> Vec<InventoryCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Ticket named by each release call, in order.
    pub fn released_tickets(&self) -> Vec<Option<TicketId>> {
        self.state.lock().unwrap().released.clone()
    }

    pub fn commits(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, InventoryCall::Commit(_)))
            .count()
    }
}

impl InventoryService for FakeInventory {
    async fn reserve(&self, items: &[ReservationLine], _holder: &veloura_core::HolderId) -> Result<ReserveOutcome, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(InventoryCall::Reserve);
        if self.unreachable_reserve {
            return Err(outage());
        }
        if let Some(product) = &self.reject {
            let unavailable: Vec<_> = items
                .iter()
                .filter(|line| line.product_id.as_str() == product)
                .map(|line| UnavailableLine {
                    product_id: line.product_id.clone(),
                    shade_id: line.shade_id.clone(),
                    requested: line.quantity,
                    reason: "insufficient_stock".into(),
                })
                .collect();
            if !unavailable.is_empty() {
                return Ok(ReserveOutcome::Rejected { unavailable });
            }
        }
        state.next_ticket += 1;
        Ok(ReserveOutcome::Reserved {
            ticket_id: TicketId::new(format!("T{}", state.next_ticket)),
            expires_at: None,
        })
    }

    async fn release(
        &self,
        _items: &[ReservationLine],
        _holder: &veloura_core::HolderId,
        ticket_id: Option<&TicketId>,
        reason: ReleaseReason,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(InventoryCall::Release(reason));
        state.released.push(ticket_id.cloned());
        Ok(())
    }

    async fn commit(&self, ticket_id: &TicketId) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(InventoryCall::Commit(ticket_id.clone()));
        if self.fail_commit {
            return Err(outage());
        }
        Ok(())
    }
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmScript {
    Succeed,
    Decline,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCall {
    CreateIntent(Price),
    Confirm,
    Refund(Price),
}

#[derive(Default)]
struct PaymentState {
    calls: Vec<PaymentCall>,
    script: VecDeque<ConfirmScript>,
    next_intent: u64,
}

#[derive(Clone, Default)]
pub struct FakePayments {
    overcharge: bool,
    fail_intent: bool,
    confirm_delay: Option<std::time::Duration>,
    clock_jump: Option<(Arc<ManualClock>, chrono::Duration)>,
    state: Arc<Mutex<PaymentState>>,
}

impl FakePayments {
    /// Queue the outcome of the next confirmation. Unscripted confirmations succeed.
    pub fn confirming(self, script: ConfirmScript) -> Self {
        self.state.lock().unwrap().script.push_back(script);
        self
    }

    /// Create intents for one cent more than requested.
    pub fn overcharging(mut self) -> Self {
        self.overcharge = true;
        self
    }

    pub fn failing_intent(mut self) -> Self {
        self.fail_intent = true;
        self
    }

    /// Hold every confirmation for `delay`.
    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.confirm_delay = Some(delay);
        self
    }

    /// Move `clock` forward by `by` while confirming.
    pub fn advancing_clock(mut self, clock: Arc<ManualClock>, by: chrono::Duration) -> Self {
        self.clock_jump = Some((clock, by));
        self
    }

    pub fn calls(&self) -> Vec<PaymentCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn confirmations(&self) -> usize {
        self.calls().iter().filter(|c| **c == PaymentCall::Confirm).count()
    }
}

impl PaymentGateway for FakePayments {
    async fn create_intent(&self, amount: Price, _metadata: &IntentMetadata) -> Result<PaymentIntent, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PaymentCall::CreateIntent(amount));
        if self.fail_intent {
            return Err(outage());
        }
        state.next_intent += 1;
        let id = format!("pi_{}", state.next_intent);
        let amount = if self.overcharge {
            amount
                .checked_add(Price::from_minor_units(1, amount.currency_code))
                .unwrap()
        } else {
            amount
        };
        Ok(PaymentIntent {
            client_secret: SecretString::from(format!("{id}_secret")),
            id: PaymentIntentId::new(id),
            amount,
        })
    }

    async fn confirm(&self, _client_secret: &SecretString) -> Result<PaymentConfirmation, ServiceError> {
        if let Some(delay) = self.confirm_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((clock, by)) = &self.clock_jump {
            clock.advance(*by);
        }

        let script = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(PaymentCall::Confirm);
            state.script.pop_front().unwrap_or(ConfirmScript::Succeed)
        };
        match script {
            ConfirmScript::Succeed => Ok(PaymentConfirmation {
                status: PaymentStatus::Succeeded,
                payment_ref: Some("ch_1".into()),
                failure_reason: None,
            }),
            ConfirmScript::Decline => Ok(PaymentConfirmation {
                status: PaymentStatus::Declined,
                payment_ref: None,
                failure_reason: Some("card_declined".into()),
            }),
            ConfirmScript::Unreachable => Err(outage()),
        }
    }

    async fn refund(&self, _payment_ref: &str, amount: Price, _reason: &str) -> Result<(), ServiceError> {
        self.state.lock().unwrap().calls.push(PaymentCall::Refund(amount));
        Ok(())
    }
}

// =============================================================================
// Analytics
// =============================================================================

#[derive(Clone, Default)]
pub struct FakeAnalytics {
    events: Arc<Mutex<Vec<CheckoutEvent>>>,
}

impl FakeAnalytics {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(CheckoutEvent::name).collect()
    }
}

impl AnalyticsSink for FakeAnalytics {
    fn track(&self, event: CheckoutEvent) {
        self.events.lock().unwrap().push(event);
    }
}
