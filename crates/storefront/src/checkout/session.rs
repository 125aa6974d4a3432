//! Checkout session state.
//!
//! A session owns everything entered during one checkout: the frozen cart,
//! customer details, addresses, the current pricing quote and payment intent.
//! Step changes go through the sequencer; field updates come from the input
//! handlers in [`CheckoutService`](super::CheckoutService).

use core::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use veloura_core::{
    Address, CurrencyCode, HolderId, PaymentIntentId, PaymentMethodRef, SessionId, SessionStatus,
    ShippingRateId, UserId,
};

use super::pricing::PricingBreakdown;
use super::snapshot::CartSnapshot;
use super::step::CheckoutStep;
use crate::services::{PaymentIntent, ShippingRate};

/// An authenticated customer, supplied when checkout starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerIdentity {
    pub user_id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Contact details from the first checkout step.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub create_account: bool,
    #[serde(skip)]
    pub password: Option<SecretString>,
}

impl CustomerInfo {
    /// Returns true if a non-blank password was supplied.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password
            .as_ref()
            .is_some_and(|p| !p.expose_secret().trim().is_empty())
    }
}

impl fmt::Debug for CustomerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerInfo")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone", &self.phone)
            .field("create_account", &self.create_account)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl From<&CustomerIdentity> for CustomerInfo {
    fn from(identity: &CustomerIdentity) -> Self {
        Self {
            email: identity.email.clone().unwrap_or_default(),
            first_name: identity.first_name.clone().unwrap_or_default(),
            last_name: identity.last_name.clone().unwrap_or_default(),
            ..Self::default()
        }
    }
}

/// Shipping step fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    pub address: Address,
    pub rate_id: Option<ShippingRateId>,
}

/// Payment step fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub method: Option<PaymentMethodRef>,
    pub same_as_shipping: bool,
    pub billing_address: Address,
}

impl Default for PaymentDetails {
    fn default() -> Self {
        Self {
            method: None,
            same_as_shipping: true,
            billing_address: Address::default(),
        }
    }
}

/// A breakdown together with the inputs it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedQuote {
    pub breakdown: PricingBreakdown,
    pub address: Address,
    pub rate: ShippingRate,
}

/// One customer's checkout.
#[derive(Debug)]
pub struct CheckoutSession {
    id: SessionId,
    holder: HolderId,
    identity: Option<CustomerIdentity>,
    snapshot: CartSnapshot,
    customer: CustomerInfo,
    shipping: ShippingDetails,
    payment: PaymentDetails,
    quote: Option<PricedQuote>,
    intent: Option<PaymentIntent>,
    step: CheckoutStep,
    status: SessionStatus,
    notice: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Start a session over a captured cart.
    ///
    /// Authenticated customers hold reservations under their user id and get
    /// their contact details pre-filled; guests are keyed on the session id.
    #[must_use]
    pub fn new(
        id: SessionId,
        snapshot: CartSnapshot,
        identity: Option<CustomerIdentity>,
        now: DateTime<Utc>,
    ) -> Self {
        let holder = identity
            .as_ref()
            .map_or_else(|| HolderId::Guest(id.clone()), |i| HolderId::User(i.user_id.clone()));
        let customer = identity.as_ref().map(CustomerInfo::from).unwrap_or_default();
        Self {
            id,
            holder,
            identity,
            snapshot,
            customer,
            shipping: ShippingDetails::default(),
            payment: PaymentDetails::default(),
            quote: None,
            intent: None,
            step: CheckoutStep::CustomerInfo,
            status: SessionStatus::Active,
            notice: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub const fn holder(&self) -> &HolderId {
        &self.holder
    }

    #[must_use]
    pub const fn identity(&self) -> Option<&CustomerIdentity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub const fn snapshot(&self) -> &CartSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub const fn customer(&self) -> &CustomerInfo {
        &self.customer
    }

    #[must_use]
    pub const fn shipping(&self) -> &ShippingDetails {
        &self.shipping
    }

    #[must_use]
    pub const fn payment(&self) -> &PaymentDetails {
        &self.payment
    }

    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.snapshot.currency()
    }

    /// Current pricing, if one has been computed since the last relevant edit.
    #[must_use]
    pub fn pricing(&self) -> Option<&PricingBreakdown> {
        self.quote.as_ref().map(|q| &q.breakdown)
    }

    #[must_use]
    pub const fn quote(&self) -> Option<&PricedQuote> {
        self.quote.as_ref()
    }

    #[must_use]
    pub const fn intent(&self) -> Option<&PaymentIntent> {
        self.intent.as_ref()
    }

    /// Address payment is billed to.
    #[must_use]
    pub const fn billing_address(&self) -> &Address {
        if self.payment.same_as_shipping {
            &self.shipping.address
        } else {
            &self.payment.billing_address
        }
    }

    /// Returns true if the quote was computed for the current address and rate
    /// and has a positive total.
    #[must_use]
    pub fn has_fresh_pricing(&self) -> bool {
        self.quote.as_ref().is_some_and(|q| {
            q.address == self.shipping.address
                && self.shipping.rate_id.as_ref() == Some(&q.rate.id)
                && !q.breakdown.total().is_zero()
        })
    }

    /// Returns true if the payment intent charges exactly the current total.
    #[must_use]
    pub fn has_intent_for_total(&self) -> bool {
        match (&self.intent, self.pricing()) {
            (Some(intent), Some(pricing)) => intent.amount == pricing.total(),
            _ => false,
        }
    }

    pub(crate) fn set_customer(&mut self, customer: CustomerInfo, now: DateTime<Utc>) {
        self.customer = customer;
        self.touch(now);
    }

    /// Replace the shipping fields. A changed address or rate invalidates the
    /// quote and, with it, the payment intent.
    pub(crate) fn set_shipping(&mut self, shipping: ShippingDetails, now: DateTime<Utc>) {
        if shipping != self.shipping {
            self.invalidate_pricing();
        }
        self.shipping = shipping;
        self.touch(now);
    }

    /// Replace the payment fields. A changed method invalidates the intent.
    pub(crate) fn set_payment(&mut self, payment: PaymentDetails, now: DateTime<Utc>) {
        if payment.method != self.payment.method {
            self.intent = None;
        }
        self.payment = payment;
        self.touch(now);
    }

    pub(crate) fn set_quote(&mut self, quote: PricedQuote) {
        if self.quote.as_ref() != Some(&quote) {
            self.intent = None;
        }
        self.quote = Some(quote);
    }

    pub(crate) fn set_intent(&mut self, intent: PaymentIntent) {
        self.intent = Some(intent);
    }

    pub(crate) fn clear_intent(&mut self) {
        self.intent = None;
    }

    pub(crate) fn set_step(&mut self, step: CheckoutStep, now: DateTime<Utc>) {
        self.step = step;
        self.touch(now);
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.touch(now);
    }

    /// Message shown above the form after a recoverable failure.
    pub(crate) fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    fn invalidate_pricing(&mut self) {
        self.quote = None;
        self.intent = None;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Client-facing view of the session.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            step: self.step,
            status: self.status,
            cart: self.snapshot.clone(),
            customer: self.customer.clone(),
            shipping: self.shipping.clone(),
            shipping_rate: self.quote.as_ref().map(|q| q.rate.clone()),
            payment: self.payment.clone(),
            pricing: self.pricing().copied(),
            payment_intent: self.intent.as_ref().map(|i| i.id.clone()),
            notice: self.notice.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable snapshot of a session returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub step: CheckoutStep,
    pub status: SessionStatus,
    pub cart: CartSnapshot,
    pub customer: CustomerInfo,
    pub shipping: ShippingDetails,
    pub shipping_rate: Option<ShippingRate>,
    pub payment: PaymentDetails,
    pub pricing: Option<PricingBreakdown>,
    pub payment_intent: Option<PaymentIntentId>,
    pub notice: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
