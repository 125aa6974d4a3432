//! Live shopping carts.
//!
//! Carts are explicit state containers keyed by [`CartId`]. The checkout never
//! reads a live cart after it starts: it captures a
//! [`CartSnapshot`](crate::checkout::CartSnapshot) instead, so edits made in
//! another tab cannot change an in-flight checkout.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use veloura_core::{CartId, CurrencyCode, Price, PriceError, ProductId, ShadeId};

/// Carts idle for longer than this are dropped.
const CART_IDLE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Upper bound on the quantity of a single line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Errors raised by cart operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("cart not found: {0}")]
    NotFound(CartId),
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY} (got {0})")]
    InvalidQuantity(u32),
    #[error("line not in cart: {0}")]
    LineNotFound(ProductId),
    #[error("price in {found:?} does not match cart currency {expected:?}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        found: CurrencyCode,
    },
    #[error("price error: {0}")]
    Price(#[from] PriceError),
}

/// One product (and optional shade) in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "CartLineItemInput")]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub shade_id: Option<ShadeId>,
    quantity: u32,
    /// Unit price captured when the item was added.
    pub unit_price: Price,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartLineItemInput {
    product_id: ProductId,
    #[serde(default)]
    shade_id: Option<ShadeId>,
    quantity: u32,
    unit_price: Price,
}

impl TryFrom<CartLineItemInput> for CartLineItem {
    type Error = CartError;

    fn try_from(input: CartLineItemInput) -> Result<Self, Self::Error> {
        Self::new(input.product_id, input.shade_id, input.quantity, input.unit_price)
    }
}

impl CartLineItem {
    /// Create a line item.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` unless `1 <= quantity <= MAX_LINE_QUANTITY`,
    /// and `CartError::Price` for a negative unit price.
    pub fn new(
        product_id: ProductId,
        shade_id: Option<ShadeId>,
        quantity: u32,
        unit_price: Price,
    ) -> Result<Self, CartError> {
        validate_quantity(quantity)?;
        let unit_price = Price::non_negative(unit_price.amount, unit_price.currency_code)?;
        Ok(Self {
            product_id,
            shade_id,
            quantity,
            unit_price,
        })
    }

    /// Number of units on this line (always at least 1).
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// `unit_price × quantity`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the product does not fit.
    pub fn line_total(&self) -> Result<Price, PriceError> {
        self.unit_price.checked_times(self.quantity)
    }

    fn matches(&self, product_id: &ProductId, shade_id: Option<&ShadeId>) -> bool {
        &self.product_id == product_id && self.shade_id.as_ref() == shade_id
    }
}

const fn validate_quantity(quantity: u32) -> Result<(), CartError> {
    if quantity == 0 || quantity > MAX_LINE_QUANTITY {
        return Err(CartError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// A customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: CartId,
    currency: CurrencyCode,
    items: Vec<CartLineItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new(id: CartId, currency: CurrencyCode) -> Self {
        Self {
            id,
            currency,
            items: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &CartId {
        &self.id
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
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(CartLineItem::quantity).sum()
    }

    /// Add a line, merging with an existing line for the same product and shade.
    ///
    /// A merged line keeps the unit price it was first added at.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or if the merged quantity is too large.
    pub fn add(&mut self, line: CartLineItem) -> Result<(), CartError> {
        if line.unit_price.currency_code != self.currency {
            return Err(CartError::CurrencyMismatch {
                expected: self.currency,
                found: line.unit_price.currency_code,
            });
        }

        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|item| item.matches(&line.product_id, line.shade_id.as_ref()))
        {
            let merged = existing.quantity.saturating_add(line.quantity);
            validate_quantity(merged)?;
            existing.quantity = merged;
        } else {
            self.items.push(line);
        }
        Ok(())
    }

    /// Set the quantity of a line. A quantity of zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not exist or the quantity is too large.
    pub fn set_quantity(
        &mut self,
        product_id: &ProductId,
        shade_id: Option<&ShadeId>,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove(product_id, shade_id);
        }
        validate_quantity(quantity)?;
        let line = self
            .items
            .iter_mut()
            .find(|item| item.matches(product_id, shade_id))
            .ok_or_else(|| CartError::LineNotFound(product_id.clone()))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` if the line does not exist.
    pub fn remove(&mut self, product_id: &ProductId, shade_id: Option<&ShadeId>) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|item| !item.matches(product_id, shade_id));
        if self.items.len() == before {
            return Err(CartError::LineNotFound(product_id.clone()));
        }
        Ok(())
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the sum does not fit.
    pub fn subtotal(&self) -> Result<Price, PriceError> {
        let lines = self
            .items
            .iter()
            .map(CartLineItem::line_total)
            .collect::<Result<Vec<_>, _>>()?;
        Price::sum(self.currency, lines)
    }
}

/// In-memory cart storage.
///
/// Cheaply cloneable; each cart sits behind its own async mutex.
#[derive(Clone)]
pub struct CartStore {
    carts: Cache<CartId, Arc<Mutex<Cart>>>,
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let carts = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(CART_IDLE_TTL)
            .build();
        Self { carts }
    }

    /// Create a new empty cart.
    pub async fn create(&self, currency: CurrencyCode) -> Cart {
        let cart = Cart::new(CartId::generate(), currency);
        self.carts
            .insert(cart.id.clone(), Arc::new(Mutex::new(cart.clone())))
            .await;
        cart
    }

    /// Get a copy of a cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` if no such cart exists.
    pub async fn get(&self, id: &CartId) -> Result<Cart, CartError> {
        let cart = self.handle(id).await?;
        let guard = cart.lock().await;
        Ok(guard.clone())
    }

    /// Apply `f` to a cart and return a copy of the updated cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotFound` or whatever `f` returns.
    pub async fn update<F>(&self, id: &CartId, f: F) -> Result<Cart, CartError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartError> + Send,
    {
        let cart = self.handle(id).await?;
        let mut guard = cart.lock().await;
        f(&mut guard)?;
        Ok(guard.clone())
    }

    /// Empty a cart after its order was placed. Missing carts are ignored.
    pub async fn clear(&self, id: &CartId) {
        if let Some(cart) = self.carts.get(id).await {
            cart.lock().await.clear();
        }
    }

    async fn handle(&self, id: &CartId) -> Result<Arc<Mutex<Cart>>, CartError> {
        self.carts
            .get(id)
            .await
            .ok_or_else(|| CartError::NotFound(id.clone()))
    }
}
