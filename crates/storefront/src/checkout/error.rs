//! Checkout error type.

use thiserror::Error;
use veloura_core::{SessionId, SessionStatus};

use super::coordinator::PlacementError;
use super::pricing::PricingError;
use super::snapshot::SnapshotError;
use super::step::{CheckoutStep, TransitionError};
use crate::cart::CartError;
use crate::services::ServiceError;

const UNAVAILABLE: &str = "We're having trouble reaching one of our services. Please try again.";
const INTERNAL: &str = "Something went wrong. Please try again later.";

/// Errors returned by [`CheckoutService`](super::CheckoutService) operations.
///
/// Field validation problems are not errors; they come back in a
/// [`StepOutcome`](super::StepOutcome).
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("checkout session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("session is on {actual:?}, not {expected:?}")]
    WrongStep {
        expected: CheckoutStep,
        actual: CheckoutStep,
    },

    #[error("session is closed ({0:?})")]
    SessionClosed(SessionStatus),

    #[error("transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("order placement already in progress")]
    InProgress,

    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("placement failed: {0}")]
    Placement(#[from] PlacementError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

impl CheckoutError {
    /// Message safe to show a shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionNotFound(_) => "Your checkout session has expired. Please start again from your cart.".into(),
            Self::Cart(CartError::NotFound(_)) => "Cart not found".into(),
            Self::Cart(e) => e.to_string(),
            Self::Snapshot(SnapshotError::EmptyCart) => "Your cart is empty".into(),
            Self::Snapshot(SnapshotError::NothingToCharge) => {
                "Your cart has no paid items. Add a product to check out.".into()
            }
            Self::WrongStep { .. } | Self::Transition(_) => {
                "That action isn't available at this step of checkout.".into()
            }
            Self::SessionClosed(_) => "This checkout is no longer active.".into(),
            Self::InProgress => "Your order is already being placed.".into(),
            Self::Pricing(PricingError::UnknownRate(_)) => {
                "The selected shipping method is no longer available.".into()
            }
            Self::Placement(e) => placement_message(e).into(),
            Self::Pricing(_) | Self::Service(_) => UNAVAILABLE.into(),
            Self::Snapshot(SnapshotError::Price(_)) => INTERNAL.into(),
        }
    }

    /// Returns true for failures that indicate a bug rather than a shopper or
    /// upstream problem.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Placement(PlacementError::ContractViolation(_))
                | Self::Snapshot(SnapshotError::Price(_))
                | Self::Pricing(PricingError::Arithmetic(_))
        )
    }
}

/// Shopper-facing message for a failed placement.
#[must_use]
pub const fn placement_message(error: &PlacementError) -> &'static str {
    match error {
        PlacementError::InventoryUnavailable(_) => {
            "Some items in your cart are no longer available. Please update your cart."
        }
        PlacementError::PaymentDeclined { .. } => "Your payment was declined. Please try a different payment method.",
        PlacementError::ReservationExpired { .. } | PlacementError::CommitFailed { .. } => {
            "We couldn't complete your order and your payment has been refunded. Please try again."
        }
        PlacementError::ServiceUnavailable { .. } => UNAVAILABLE,
        PlacementError::ContractViolation(_) => INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_transport_detail() {
        let err = CheckoutError::Service(ServiceError::Api {
            status: 500,
            message: "stack trace from upstream".into(),
        });
        assert!(!err.user_message().contains("stack trace"));
        assert!(!err.is_internal());
    }

    #[test]
    fn test_contract_violation_is_internal() {
        let err = CheckoutError::Placement(PlacementError::ContractViolation("intent mismatch".into()));
        assert!(err.is_internal());
        assert!(!err.user_message().contains("intent"));
    }
}
