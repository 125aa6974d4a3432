//! Checkout orchestrator.
//!
//! Owns the session store and wires the sequencer, pricing accumulator and
//! coordinator together. Each session sits behind its own async mutex so only
//! one operation runs against it at a time; `place_order` uses `try_lock` so a
//! duplicate request is dropped instead of queued.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::instrument;
use veloura_core::{Address, CartId, SessionId, SessionStatus};

use super::clock::Clock;
use super::coordinator::{Order, PlacementError, PlacementRequest, ReservationCoordinator};
use super::error::{CheckoutError, placement_message};
use super::pricing::{PricingAccumulator, PricingError};
use super::session::{
    CheckoutSession, CustomerIdentity, CustomerInfo, PaymentDetails, PricedQuote, SessionView, ShippingDetails,
};
use super::snapshot::CartSnapshot;
use super::step::{self, CheckoutStep, FieldErrors, StepEvent, StepOutcome, transition};
use crate::cart::CartStore;
use crate::services::{
    AnalyticsSink, CheckoutEvent, EventItem, IntentMetadata, InventoryService, PAYMENT_METHOD_KEY, PaymentGateway,
    ShippingRate, ShippingTaxService,
};

const GENERAL: &str = "general";
const PRICING_RETRY: &str = "We couldn't calculate shipping and tax. Please try again.";
const PAYMENT_RETRY: &str = "We couldn't prepare your payment. Please try again.";
const SERVICE_RETRY: &str = "We couldn't place your order. Please try again.";

/// How long completed orders are remembered for duplicate place-order calls.
const COMPLETED_ORDER_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Tunables for the checkout.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutSettings {
    /// How long a reservation may be held before commit.
    pub reservation_ttl: chrono::Duration,
    /// Sessions idle for longer than this are abandoned.
    pub session_idle: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
            session_idle: Duration::from_secs(60 * 60),
        }
    }
}

/// The external services a checkout talks to.
pub struct Collaborators<I, P, S, A> {
    pub inventory: I,
    pub payments: P,
    pub shipping: S,
    pub analytics: A,
}

/// Result of an `advance` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResult {
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub session: SessionView,
}

type SessionHandle = Arc<Mutex<CheckoutSession>>;

struct Inner<I, P, S, A> {
    carts: CartStore,
    sessions: Cache<SessionId, SessionHandle>,
    orders: Cache<SessionId, Order>,
    pricing: PricingAccumulator<S>,
    coordinator: ReservationCoordinator<I, P>,
    analytics: A,
    clock: Arc<dyn Clock>,
}

/// Checkout orchestrator. Cheaply cloneable.
pub struct CheckoutService<I, P, S, A> {
    inner: Arc<Inner<I, P, S, A>>,
}

impl<I, P, S, A> Clone for CheckoutService<I, P, S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, P, S, A> CheckoutService<I, P, S, A>
where
    I: InventoryService,
    P: PaymentGateway,
    S: ShippingTaxService,
    A: AnalyticsSink,
{
    #[must_use]
    pub fn new(
        carts: CartStore,
        collaborators: Collaborators<I, P, S, A>,
        settings: CheckoutSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let Collaborators {
            inventory,
            payments,
            shipping,
            analytics,
        } = collaborators;

        let sessions = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(settings.session_idle)
            .build();
        let orders = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(COMPLETED_ORDER_TTL)
            .build();

        Self {
            inner: Arc::new(Inner {
                carts,
                sessions,
                orders,
                pricing: PricingAccumulator::new(shipping),
                coordinator: ReservationCoordinator::new(
                    inventory,
                    payments,
                    Arc::clone(&clock),
                    settings.reservation_ttl,
                ),
                analytics,
                clock,
            }),
        }
    }

    /// The cart store sessions are started from.
    #[must_use]
    pub fn carts(&self) -> &CartStore {
        &self.inner.carts
    }

    /// Start a checkout over the current contents of a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is missing or has nothing to pay for.
    #[instrument(skip(self, identity), fields(authenticated = identity.is_some()))]
    pub async fn start(
        &self,
        cart_id: &CartId,
        identity: Option<CustomerIdentity>,
    ) -> Result<SessionView, CheckoutError> {
        let cart = self.inner.carts.get(cart_id).await?;
        let now = self.inner.clock.now();
        let snapshot = CartSnapshot::capture(&cart, now)?;

        let session = CheckoutSession::new(SessionId::generate(), snapshot, identity, now);
        let view = session.view();
        self.inner
            .sessions
            .insert(session.id().clone(), Arc::new(Mutex::new(session)))
            .await;

        self.inner.analytics.track(CheckoutEvent::BeginCheckout {
            session_id: view.id.clone(),
            value: view.cart.subtotal(),
            items: view.cart.items().iter().map(EventItem::from).collect(),
        });
        tracing::info!(session_id = %view.id, "checkout started");
        Ok(view)
    }

    /// Current state of a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for unknown or expired sessions.
    pub async fn get(&self, id: &SessionId) -> Result<SessionView, CheckoutError> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(session.view())
    }

    /// Replace the customer details. Only allowed on the customer step.
    ///
    /// # Errors
    ///
    /// Returns `WrongStep` if the session is on another step.
    pub async fn update_customer(&self, id: &SessionId, customer: CustomerInfo) -> Result<SessionView, CheckoutError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        ensure_step(&session, CheckoutStep::CustomerInfo)?;
        session.set_customer(customer, self.inner.clock.now());
        Ok(session.view())
    }

    /// Replace the shipping address and rate. Only allowed on the shipping step.
    ///
    /// Changing either invalidates the current pricing; it is recomputed when
    /// the step is completed.
    ///
    /// # Errors
    ///
    /// Returns `WrongStep` if the session is on another step.
    pub async fn update_shipping(
        &self,
        id: &SessionId,
        shipping: ShippingDetails,
    ) -> Result<SessionView, CheckoutError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        ensure_step(&session, CheckoutStep::Shipping)?;
        session.set_shipping(shipping, self.inner.clock.now());
        Ok(session.view())
    }

    /// Shipping options for an address, defaulting to the session's address.
    ///
    /// # Errors
    ///
    /// Returns `Pricing` if the shipping service is unavailable.
    pub async fn shipping_rates(
        &self,
        id: &SessionId,
        address: Option<Address>,
    ) -> Result<Vec<ShippingRate>, CheckoutError> {
        let address = match address {
            Some(address) => address,
            None => {
                let handle = self.session(id).await?;
                let session = handle.lock().await;
                session.shipping().address.clone()
            }
        };
        let rates = self.inner.pricing.rates(&address).await?;
        Ok(rates.as_ref().clone())
    }

    /// Replace the payment fields. Only allowed on the payment step.
    ///
    /// # Errors
    ///
    /// Returns `WrongStep` if the session is on another step.
    pub async fn update_payment(&self, id: &SessionId, payment: PaymentDetails) -> Result<SessionView, CheckoutError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        ensure_step(&session, CheckoutStep::Payment)?;
        session.set_payment(payment, self.inner.clock.now());
        Ok(session.view())
    }

    /// Complete the current step.
    ///
    /// Completing shipping recomputes pricing; completing payment creates the
    /// payment intent for the total. Validation problems and recoverable
    /// service failures come back as field errors with the step unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or cannot move forward.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn advance(&self, id: &SessionId) -> Result<AdvanceResult, CheckoutError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        ensure_open(&session)?;

        let from = session.step();
        let errors = step::validate_step(&session);
        if !errors.is_empty() {
            return Ok(AdvanceResult {
                outcome: StepOutcome::rejected(from, errors),
                session: session.view(),
            });
        }

        let prepared = match from {
            CheckoutStep::Shipping => self.price(&mut session).await?,
            CheckoutStep::Payment => self.prepare_intent(&mut session).await,
            _ => Ok(()),
        };
        if let Err(errors) = prepared {
            return Ok(AdvanceResult {
                outcome: StepOutcome::rejected(from, errors),
                session: session.view(),
            });
        }

        let outcome = step::advance(&session)?;
        if !outcome.is_rejected() {
            let now = self.inner.clock.now();
            session.set_step(outcome.next_step, now);
            session.set_notice(None);
            self.track_transition(&session, from, outcome.next_step);
        }

        Ok(AdvanceResult {
            outcome,
            session: session.view(),
        })
    }

    /// Go back one step, keeping entered values.
    ///
    /// # Errors
    ///
    /// Returns an error once the order is placed or the session is closed.
    pub async fn retreat(&self, id: &SessionId) -> Result<SessionView, CheckoutError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        ensure_open(&session)?;

        let from = session.step();
        let to = step::retreat(&session)?;
        if from == CheckoutStep::Failed {
            session.clear_intent();
            session.set_status(SessionStatus::Active, self.inner.clock.now());
        }
        session.set_step(to, self.inner.clock.now());
        self.track_transition(&session, from, to);
        Ok(session.view())
    }

    /// Return a failed checkout to the payment step.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is on the failed step.
    pub async fn retry(&self, id: &SessionId) -> Result<SessionView, CheckoutError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        ensure_open(&session)?;

        let from = session.step();
        let to = transition(from, StepEvent::Retry)?;
        let now = self.inner.clock.now();
        session.clear_intent();
        session.set_status(SessionStatus::Active, now);
        session.set_step(to, now);
        self.track_transition(&session, from, to);
        Ok(session.view())
    }

    /// Place the order: reserve, confirm payment, commit.
    ///
    /// A call made while another is in flight for the same session fails with
    /// `InProgress`; a call after success returns the order already placed.
    ///
    /// # Errors
    ///
    /// Returns `Placement` with the protocol failure. The session is updated
    /// first: aborted when stock ran out, moved to the failed step after a
    /// decline or refund, and left on review after a service outage.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn place_order(&self, id: &SessionId) -> Result<Order, CheckoutError> {
        if let Some(order) = self.inner.orders.get(id).await {
            return Ok(order);
        }
        let handle = self.session(id).await?;
        let Ok(mut session) = handle.try_lock() else {
            tracing::info!("duplicate place-order ignored");
            return Err(CheckoutError::InProgress);
        };

        if session.status() == SessionStatus::Placed {
            return self
                .inner
                .orders
                .get(id)
                .await
                .ok_or(CheckoutError::SessionClosed(SessionStatus::Placed));
        }
        ensure_open(&session)?;
        ensure_step(&session, CheckoutStep::Review)?;

        let (Some(pricing), Some(intent)) = (session.pricing().copied(), session.intent().cloned()) else {
            return Err(PlacementError::ContractViolation("review step without pricing or intent".into()).into());
        };

        session.set_status(SessionStatus::Placing, self.inner.clock.now());
        let result = {
            let request = PlacementRequest {
                session_id: session.id(),
                holder: session.holder(),
                email: &session.customer().email,
                snapshot: session.snapshot(),
                pricing: &pricing,
                intent: &intent,
                shipping_address: &session.shipping().address,
                billing_address: session.billing_address(),
            };
            self.inner.coordinator.place_order(&request).await
        };

        match result {
            Ok(order) => {
                let now = self.inner.clock.now();
                let to = transition(session.step(), StepEvent::OrderPlaced)?;
                session.set_step(to, now);
                session.set_status(SessionStatus::Placed, now);
                session.set_notice(None);

                self.inner.orders.insert(id.clone(), order.clone()).await;
                self.inner.carts.clear(session.snapshot().cart_id()).await;
                self.inner.sessions.invalidate(id).await;

                self.inner.analytics.track(CheckoutEvent::Purchase {
                    session_id: id.clone(),
                    transaction_id: order.id().clone(),
                    value: pricing.total(),
                    shipping: pricing.shipping_cost(),
                    tax: pricing.tax(),
                    items: order.items().iter().map(EventItem::from).collect(),
                });
                Ok(order)
            }
            Err(error) => {
                self.record_failure(&mut session, &error)?;
                Err(error.into())
            }
        }
    }

    /// Abandon a checkout. Nothing is held outside `place_order`, so there is
    /// no reservation to release.
    ///
    /// # Errors
    ///
    /// Returns `InProgress` if an order is being placed.
    pub async fn cancel(&self, id: &SessionId) -> Result<(), CheckoutError> {
        let handle = self.session(id).await?;
        let Ok(mut session) = handle.try_lock() else {
            return Err(CheckoutError::InProgress);
        };
        if session.status() == SessionStatus::Placed {
            return Err(CheckoutError::SessionClosed(SessionStatus::Placed));
        }
        session.set_status(SessionStatus::Cancelled, self.inner.clock.now());
        self.inner.analytics.track(CheckoutEvent::CheckoutCancelled {
            session_id: id.clone(),
            step: session.step(),
        });
        drop(session);
        self.inner.sessions.invalidate(id).await;
        Ok(())
    }

    async fn session(&self, id: &SessionId) -> Result<SessionHandle, CheckoutError> {
        self.inner
            .sessions
            .get(id)
            .await
            .ok_or_else(|| CheckoutError::SessionNotFound(id.clone()))
    }

    /// Bring pricing up to date for the current address and rate.
    async fn price(&self, session: &mut CheckoutSession) -> Result<Result<(), FieldErrors>, CheckoutError> {
        if session.has_fresh_pricing() {
            return Ok(Ok(()));
        }
        let address = session.shipping().address.clone();
        let Some(rate_id) = session.shipping().rate_id.clone() else {
            return Ok(Err(field("shipping", "Please select a shipping method")));
        };

        let priced = async {
            let rate = self.inner.pricing.resolve_rate(&address, &rate_id).await?;
            let breakdown = self
                .inner
                .pricing
                .recompute(session.snapshot(), &address, Some(&rate))
                .await?;
            Ok::<_, PricingError>((rate, breakdown))
        }
        .await;

        match priced {
            Ok((rate, breakdown)) => {
                session.set_quote(PricedQuote {
                    breakdown,
                    address,
                    rate,
                });
                Ok(Ok(()))
            }
            Err(PricingError::UnknownRate(_)) => Ok(Err(field(
                "shipping",
                "The selected shipping method is no longer available",
            ))),
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "pricing unavailable");
                session.set_notice(Some(PRICING_RETRY.into()));
                Ok(Err(field(GENERAL, PRICING_RETRY)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Make sure an intent exists for the current total.
    async fn prepare_intent(&self, session: &mut CheckoutSession) -> Result<(), FieldErrors> {
        if session.has_intent_for_total() {
            return Ok(());
        }
        let Some(total) = session.pricing().map(|p| p.total()) else {
            // Caught by the guard in `step::advance`.
            return Ok(());
        };

        let mut metadata = IntentMetadata::new();
        metadata.insert("session_id".into(), session.id().to_string());
        metadata.insert("cart_id".into(), session.snapshot().cart_id().to_string());
        metadata.insert("holder".into(), session.holder().wire_value());
        if let Some(method) = &session.payment().method {
            metadata.insert(PAYMENT_METHOD_KEY.into(), method.to_string());
        }

        match self.inner.coordinator.prepare_payment(total, &metadata).await {
            Ok(intent) => {
                session.set_intent(intent);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "payment intent creation failed");
                session.set_notice(Some(PAYMENT_RETRY.into()));
                Err(field(GENERAL, PAYMENT_RETRY))
            }
        }
    }

    /// Move the session to the state matching a placement failure.
    fn record_failure(&self, session: &mut CheckoutSession, error: &PlacementError) -> Result<(), CheckoutError> {
        let now = self.inner.clock.now();
        match error {
            PlacementError::InventoryUnavailable(lines) => {
                tracing::info!(lines = lines.len(), "checkout aborted, stock unavailable");
                session.set_status(SessionStatus::Aborted, now);
                session.set_notice(Some(placement_message(error).into()));
            }
            PlacementError::PaymentDeclined { .. }
            | PlacementError::ReservationExpired { .. }
            | PlacementError::CommitFailed { .. } => {
                let to = transition(session.step(), StepEvent::PaymentFailed)?;
                session.set_step(to, now);
                session.set_status(SessionStatus::Failed, now);
                session.clear_intent();
                session.set_notice(Some(placement_message(error).into()));
                self.inner.analytics.track(CheckoutEvent::PaymentFailed {
                    session_id: session.id().clone(),
                    reason: error.to_string(),
                });
            }
            PlacementError::ServiceUnavailable { stage, .. } => {
                tracing::warn!(%stage, error = %error, "placement interrupted");
                session.set_status(SessionStatus::Active, now);
                session.set_notice(Some(SERVICE_RETRY.into()));
            }
            PlacementError::ContractViolation(detail) => {
                tracing::error!(detail = %detail, "checkout contract violation");
                session.set_status(SessionStatus::Active, now);
            }
        }
        Ok(())
    }

    fn track_transition(&self, session: &CheckoutSession, from: CheckoutStep, to: CheckoutStep) {
        self.inner.analytics.track(CheckoutEvent::StepTransition {
            session_id: session.id().clone(),
            from,
            to,
        });
        if to == CheckoutStep::Review
            && let Some(pricing) = session.pricing()
        {
            self.inner.analytics.track(CheckoutEvent::AddPaymentInfo {
                session_id: session.id().clone(),
                value: pricing.total(),
                items: session.snapshot().items().iter().map(EventItem::from).collect(),
            });
        }
    }
}

fn field(key: &str, message: &str) -> FieldErrors {
    FieldErrors::from([(key.to_string(), message.to_string())])
}

fn ensure_open(session: &CheckoutSession) -> Result<(), CheckoutError> {
    if session.status().is_terminal() {
        return Err(CheckoutError::SessionClosed(session.status()));
    }
    Ok(())
}

fn ensure_step(session: &CheckoutSession, expected: CheckoutStep) -> Result<(), CheckoutError> {
    ensure_open(session)?;
    if session.step() != expected {
        return Err(CheckoutError::WrongStep {
            expected,
            actual: session.step(),
        });
    }
    Ok(())
}
