//! Frozen copy of a cart taken when checkout starts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use veloura_core::{CartId, CurrencyCode, Price, PriceError};

use crate::cart::{Cart, CartLineItem};
use crate::services::ReservationLine;

/// Errors raised when capturing a snapshot.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("cannot check out an empty cart")]
    EmptyCart,
    /// Every line is free, so there is no amount to charge.
    #[error("cart subtotal is zero")]
    NothingToCharge,
    #[error("cart subtotal could not be computed: {0}")]
    Price(#[from] PriceError),
}

/// Immutable cart contents for the lifetime of one checkout session.
///
/// Lines are copied out of the live cart; later cart edits are not visible here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    cart_id: CartId,
    currency: CurrencyCode,
    items: Vec<CartLineItem>,
    subtotal: Price,
    captured_at: DateTime<Utc>,
}

impl CartSnapshot {
    /// Capture the current contents of `cart`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::EmptyCart` for a cart without lines and
    /// `SnapshotError::NothingToCharge` when the subtotal is zero.
    pub fn capture(cart: &Cart, captured_at: DateTime<Utc>) -> Result<Self, SnapshotError> {
        if cart.is_empty() {
            return Err(SnapshotError::EmptyCart);
        }
        let subtotal = cart.subtotal()?;
        if subtotal.is_zero() {
            return Err(SnapshotError::NothingToCharge);
        }
        Ok(Self {
            cart_id: cart.id().clone(),
            currency: cart.currency(),
            items: cart.items().to_vec(),
            subtotal,
            captured_at,
        })
    }

    #[must_use]
    pub const fn cart_id(&self) -> &CartId {
        &self.cart_id
    }

    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Σ unit price × quantity, computed once at capture.
    #[must_use]
    pub const fn subtotal(&self) -> Price {
        self.subtotal
    }

    /// Lines in the shape the inventory service reserves.
    #[must_use]
    pub fn reservation_lines(&self) -> Vec<ReservationLine> {
        self.items
            .iter()
            .map(|item| ReservationLine {
                product_id: item.product_id.clone(),
                shade_id: item.shade_id.clone(),
                quantity: item.quantity(),
            })
            .collect()
    }
}
