//! Status enums for checkout entities.

use serde::{Deserialize, Serialize};

/// Lifecycle of an inventory reservation ticket.
///
/// `Reserved` is the only non-terminal state: a ticket leaves it exactly once,
/// either to `Released` (unwind) or `Committed` (order placed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Released,
    Committed,
}

impl ReservationStatus {
    /// Returns true once the ticket can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Committed)
    }
}

/// Overall status of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The customer is filling in checkout steps.
    #[default]
    Active,
    /// An order placement is in flight.
    Placing,
    /// The order was placed; the session is about to be torn down.
    Placed,
    /// Payment failed; the customer may retry from the payment step.
    Failed,
    /// Stock ran out during reservation; the customer must update their cart.
    Aborted,
    /// The customer cancelled checkout.
    Cancelled,
}

impl SessionStatus {
    /// Returns true if the session accepts no further input.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Placed | Self::Aborted | Self::Cancelled)
    }
}

/// Outcome reported by the payment processor when confirming an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Declined,
    RequiresAction,
    Failed,
}

impl PaymentStatus {
    /// Parse a processor status string.
    ///
    /// Unknown strings yield `None` so callers can reject malformed responses.
    #[must_use]
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "succeeded" => Some(Self::Succeeded),
            "declined" | "card_declined" => Some(Self::Declined),
            "requires_action" | "requires_payment_method" => Some(Self::RequiresAction),
            "failed" | "canceled" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if funds were captured.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}
