//! Checkout step sequencer.
//!
//! [`transition`] is the pure step table. [`advance`] and [`retreat`] apply it
//! to a session: `advance` validates the current step's fields first and
//! reports problems as a field map instead of an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use veloura_core::{Address, Email};

use super::session::CheckoutSession;

/// Steps of the checkout wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    CustomerInfo,
    Shipping,
    Payment,
    Review,
    Placed,
    Failed,
}

impl CheckoutStep {
    /// The step after this one in the happy path.
    const fn next(self) -> Option<Self> {
        match self {
            Self::CustomerInfo => Some(Self::Shipping),
            Self::Shipping => Some(Self::Payment),
            Self::Payment => Some(Self::Review),
            Self::Review | Self::Placed | Self::Failed => None,
        }
    }

    /// The step before this one.
    const fn previous(self) -> Option<Self> {
        match self {
            Self::CustomerInfo | Self::Shipping => Some(Self::CustomerInfo),
            Self::Payment => Some(Self::Shipping),
            Self::Review | Self::Failed => Some(Self::Payment),
            Self::Placed => None,
        }
    }
}

/// Inputs to the step table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEvent {
    Advance,
    Retreat,
    OrderPlaced,
    PaymentFailed,
    Retry,
}

/// Prerequisites for entering a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Entering `Payment` needs pricing computed for the current address and
    /// rate, with a positive total.
    FreshPricing,
    /// Entering `Review` needs a payment intent for the current total.
    IntentForTotal,
}

/// A step change that is not allowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {event:?} from {from:?}")]
    NotAllowed { from: CheckoutStep, event: StepEvent },
    #[error("prerequisite not met: {0:?}")]
    GuardUnmet(Guard),
}

/// Apply `event` to `step`.
///
/// # Errors
///
/// Returns `TransitionError::NotAllowed` if the table has no entry.
pub const fn transition(step: CheckoutStep, event: StepEvent) -> Result<CheckoutStep, TransitionError> {
    use CheckoutStep as S;
    use StepEvent as E;

    let next = match (step, event) {
        (_, E::Advance) => step.next(),
        (_, E::Retreat) => step.previous(),
        (S::Review, E::OrderPlaced) => Some(S::Placed),
        (S::Payment | S::Review, E::PaymentFailed) => Some(S::Failed),
        (S::Failed, E::Retry) => Some(S::Payment),
        _ => None,
    };
    match next {
        Some(next) => Ok(next),
        None => Err(TransitionError::NotAllowed { from: step, event }),
    }
}

/// Field key to user-facing message.
pub type FieldErrors = BTreeMap<String, String>;

/// Result of an `advance` attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub next_step: CheckoutStep,
    pub errors: FieldErrors,
}

impl StepOutcome {
    #[must_use]
    pub fn advanced(next_step: CheckoutStep) -> Self {
        Self {
            next_step,
            errors: FieldErrors::new(),
        }
    }

    #[must_use]
    pub const fn rejected(current: CheckoutStep, errors: FieldErrors) -> Self {
        Self {
            next_step: current,
            errors,
        }
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Validate the fields of the session's current step.
#[must_use]
pub fn validate_step(session: &CheckoutSession) -> FieldErrors {
    let mut errors = FieldErrors::new();
    match session.step() {
        CheckoutStep::CustomerInfo => {
            let customer = session.customer();
            if customer.email.trim().is_empty() {
                errors.insert("email".into(), "Email is required".into());
            } else if Email::parse(&customer.email).is_err() {
                errors.insert("email".into(), "Please enter a valid email address".into());
            }
            if customer.first_name.trim().is_empty() {
                errors.insert("firstName".into(), "First name is required".into());
            }
            if customer.last_name.trim().is_empty() {
                errors.insert("lastName".into(), "Last name is required".into());
            }
            if customer.create_account && !customer.has_password() {
                errors.insert(
                    "password".into(),
                    "Password is required for account creation".into(),
                );
            }
        }
        CheckoutStep::Shipping => {
            let shipping = session.shipping();
            address_errors(&shipping.address, false, &mut errors);
            if shipping.rate_id.is_none() {
                errors.insert("shipping".into(), "Please select a shipping method".into());
            }
        }
        CheckoutStep::Payment => {
            let payment = session.payment();
            if payment.method.is_none() {
                errors.insert("payment".into(), "Please select a payment method".into());
            }
            if !payment.same_as_shipping {
                address_errors(&payment.billing_address, true, &mut errors);
            }
        }
        CheckoutStep::Review | CheckoutStep::Placed | CheckoutStep::Failed => {}
    }
    errors
}

fn address_errors(address: &Address, billing: bool, errors: &mut FieldErrors) {
    for field in address.missing_required() {
        let (key, message) = match (field, billing) {
            ("address1", false) => ("address1", "Address is required"),
            ("address1", true) => ("billingAddress1", "Billing address is required"),
            ("city", false) => ("city", "City is required"),
            ("city", true) => ("billingCity", "Billing city is required"),
            ("state", false) => ("state", "State is required"),
            ("state", true) => ("billingState", "Billing state is required"),
            ("zipCode", false) => ("zipCode", "ZIP code is required"),
            ("zipCode", true) => ("billingZipCode", "Billing ZIP code is required"),
            _ => continue,
        };
        errors.insert(key.into(), message.into());
    }
}

/// Try to move the session forward one step.
///
/// Invalid fields leave the step unchanged and come back in
/// [`StepOutcome::errors`].
///
/// # Errors
///
/// Returns `NotAllowed` from a step without a forward move, or `GuardUnmet`
/// if the next step's prerequisites are missing.
pub fn advance(session: &CheckoutSession) -> Result<StepOutcome, TransitionError> {
    let current = session.step();
    let errors = validate_step(session);
    if !errors.is_empty() {
        return Ok(StepOutcome::rejected(current, errors));
    }

    let next = transition(current, StepEvent::Advance)?;
    match next {
        CheckoutStep::Payment if !session.has_fresh_pricing() => {
            Err(TransitionError::GuardUnmet(Guard::FreshPricing))
        }
        CheckoutStep::Review if !session.has_intent_for_total() => {
            Err(TransitionError::GuardUnmet(Guard::IntentForTotal))
        }
        _ => Ok(StepOutcome::advanced(next)),
    }
}

/// Move the session back one step. Fields are kept and not re-validated.
///
/// # Errors
///
/// Returns `NotAllowed` once the order is placed.
pub const fn retreat(session: &CheckoutSession) -> Result<CheckoutStep, TransitionError> {
    transition(session.step(), StepEvent::Retreat)
}
