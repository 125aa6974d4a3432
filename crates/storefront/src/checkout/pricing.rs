//! Pricing accumulator.
//!
//! Produces a [`PricingBreakdown`] from the cart snapshot, the shipping
//! address and the selected rate. Breakdowns are recomputed from scratch
//! whenever their inputs change; they are never patched in place.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use veloura_core::{Address, Price, PriceError, ShippingRateId};

use super::snapshot::CartSnapshot;
use crate::services::{ServiceError, ShippingRate, ShippingTaxService};

/// How long a rate quote for an address is reused.
const RATE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Errors raised while pricing a checkout.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("shipping rates unavailable: {0}")]
    RatesUnavailable(#[source] ServiceError),
    #[error("tax calculation unavailable: {0}")]
    TaxUnavailable(#[source] ServiceError),
    #[error("shipping rate {0} is not offered for this address")]
    UnknownRate(ShippingRateId),
    #[error("pricing arithmetic failed: {0}")]
    Arithmetic(#[from] PriceError),
}

impl PricingError {
    /// Returns true if the failure came from an external service and may
    /// succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RatesUnavailable(_) | Self::TaxUnavailable(_))
    }
}

/// Subtotal, shipping, tax and their sum.
///
/// Every component is non-negative and shares one currency, and
/// `total == subtotal + shipping_cost + tax` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    subtotal: Price,
    shipping_cost: Price,
    tax: Price,
    total: Price,
}

impl PricingBreakdown {
    /// Build a breakdown, deriving the total.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for a negative component and
    /// `PriceError::CurrencyMismatch` if the components disagree on currency.
    pub fn compute(subtotal: Price, shipping_cost: Price, tax: Price) -> Result<Self, PriceError> {
        let [subtotal, shipping_cost, tax] = [subtotal, shipping_cost, tax]
            .map(|p| Price::non_negative(p.amount, p.currency_code));
        let (subtotal, shipping_cost, tax) = (subtotal?, shipping_cost?, tax?);
        let total = Price::sum(subtotal.currency_code, [subtotal, shipping_cost, tax])?;
        Ok(Self {
            subtotal,
            shipping_cost,
            tax,
            total,
        })
    }

    #[must_use]
    pub const fn subtotal(&self) -> Price {
        self.subtotal
    }

    #[must_use]
    pub const fn shipping_cost(&self) -> Price {
        self.shipping_cost
    }

    #[must_use]
    pub const fn tax(&self) -> Price {
        self.tax
    }

    #[must_use]
    pub const fn total(&self) -> Price {
        self.total
    }
}

/// Computes pricing against a shipping/tax service.
pub struct PricingAccumulator<S> {
    service: S,
    rates: Cache<Address, Arc<Vec<ShippingRate>>>,
}

impl<S: ShippingTaxService> PricingAccumulator<S> {
    #[must_use]
    pub fn new(service: S) -> Self {
        let rates = Cache::builder()
            .max_capacity(1000)
            .time_to_live(RATE_CACHE_TTL)
            .build();
        Self { service, rates }
    }

    /// Shipping options for `address`, served from cache when recent.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::RatesUnavailable` if the service call fails.
    #[instrument(skip(self, address), fields(state = %address.state))]
    pub async fn rates(&self, address: &Address) -> Result<Arc<Vec<ShippingRate>>, PricingError> {
        if let Some(cached) = self.rates.get(address).await {
            return Ok(cached);
        }

        let rates = Arc::new(
            self.service
                .rates(address)
                .await
                .map_err(PricingError::RatesUnavailable)?,
        );
        self.rates.insert(address.clone(), Arc::clone(&rates)).await;
        Ok(rates)
    }

    /// Look up the rate the customer selected among those offered for `address`.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::UnknownRate` if the id is not offered.
    pub async fn resolve_rate(
        &self,
        address: &Address,
        rate_id: &ShippingRateId,
    ) -> Result<ShippingRate, PricingError> {
        self.rates(address)
            .await?
            .iter()
            .find(|rate| &rate.id == rate_id)
            .cloned()
            .ok_or_else(|| PricingError::UnknownRate(rate_id.clone()))
    }

    /// Recompute the full breakdown.
    ///
    /// Tax is requested on `subtotal + shipping` and rounded to minor units.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::TaxUnavailable` if the tax call fails, or
    /// `PricingError::Arithmetic` if amounts are negative or mixed-currency.
    #[instrument(skip_all, fields(cart_id = %snapshot.cart_id(), rate = ?rate.map(|r| &r.id)))]
    pub async fn recompute(
        &self,
        snapshot: &CartSnapshot,
        address: &Address,
        rate: Option<&ShippingRate>,
    ) -> Result<PricingBreakdown, PricingError> {
        let subtotal = snapshot.subtotal();
        let shipping = rate.map_or_else(|| Price::zero(subtotal.currency_code), |r| r.amount);
        let taxable = subtotal.checked_add(shipping)?;

        let tax = self
            .service
            .tax(address, taxable)
            .await
            .map_err(PricingError::TaxUnavailable)?;
        let tax = Price::new(tax.amount, tax.currency_code);

        let breakdown = PricingBreakdown::compute(subtotal, shipping, tax)?;
        tracing::debug!(total = %breakdown.total(), "pricing recomputed");
        Ok(breakdown)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use veloura_core::{CartId, CurrencyCode, ProductId};

    use super::*;
    use crate::cart::{Cart, CartLineItem};
    use crate::checkout::fakes::FakeShipping;

    fn usd(cents: i64) -> Price {
        Price::from_minor_units(cents, CurrencyCode::USD)
    }

    fn snapshot() -> CartSnapshot {
        let mut cart = Cart::new(CartId::new("c"), CurrencyCode::USD);
        cart.add(CartLineItem::new(ProductId::new("ruby-velvet"), None, 2, usd(2800)).unwrap())
            .unwrap();
        cart.add(CartLineItem::new(ProductId::new("golden-hour"), None, 1, usd(2800)).unwrap())
            .unwrap();
        CartSnapshot::capture(&cart, chrono::Utc::now()).unwrap()
    }

    fn address(state: &str) -> Address {
        Address {
            address1: "1 Main St".into(),
            city: "Portland".into(),
            state: state.into(),
            zip_code: "97201".into(),
            ..Address::default()
        }
    }

    #[test]
    fn test_breakdown_total_is_exact_sum() {
        let tax = Price::new(Decimal::new(609, 2), CurrencyCode::USD);
        let b = PricingBreakdown::compute(usd(8400), usd(1000), tax).unwrap();
        assert_eq!(b.total(), usd(10009));
    }

    #[test]
    fn test_breakdown_rejects_negative_and_mixed_currency() {
        assert!(PricingBreakdown::compute(usd(100), usd(-1), usd(0)).is_err());
        let eur = Price::from_minor_units(0, CurrencyCode::EUR);
        assert!(PricingBreakdown::compute(usd(100), usd(0), eur).is_err());
    }

    #[tokio::test]
    async fn test_free_shipping_tax_free_state() {
        let accumulator = PricingAccumulator::new(FakeShipping::default());
        let addr = address("OR");
        let rate = accumulator
            .resolve_rate(&addr, &ShippingRateId::new("standard"))
            .await
            .unwrap();
        let b = accumulator.recompute(&snapshot(), &addr, Some(&rate)).await.unwrap();
        assert_eq!(b.subtotal(), usd(8400));
        assert_eq!(b.shipping_cost(), usd(0));
        assert_eq!(b.tax(), usd(0));
        assert_eq!(b.total(), usd(8400));
    }

    #[tokio::test]
    async fn test_tax_is_charged_on_subtotal_plus_shipping() {
        let shipping = FakeShipping::default().with_tax_rate(Decimal::new(725, 4));
        let accumulator = PricingAccumulator::new(shipping.clone());
        let addr = address("CA");
        let rate = accumulator
            .resolve_rate(&addr, &ShippingRateId::new("express"))
            .await
            .unwrap();
        let b = accumulator.recompute(&snapshot(), &addr, Some(&rate)).await.unwrap();
        // (84 + 10) * 0.0725 = 6.815 -> 6.82
        assert_eq!(b.tax(), usd(682));
        assert_eq!(b.total(), usd(10082));
        assert_eq!(shipping.taxed_amounts(), vec![usd(9400)]);
    }

    #[tokio::test]
    async fn test_rates_are_cached_per_address() {
        let shipping = FakeShipping::default();
        let accumulator = PricingAccumulator::new(shipping.clone());
        accumulator.rates(&address("OR")).await.unwrap();
        accumulator.rates(&address("OR")).await.unwrap();
        accumulator.rates(&address("CA")).await.unwrap();
        assert_eq!(shipping.rate_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_rate() {
        let accumulator = PricingAccumulator::new(FakeShipping::default());
        let err = accumulator
            .resolve_rate(&address("OR"), &ShippingRateId::new("teleport"))
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::UnknownRate(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_tax_outage_is_transient() {
        let accumulator = PricingAccumulator::new(FakeShipping::default().failing_tax());
        let err = accumulator
            .recompute(&snapshot(), &address("OR"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::TaxUnavailable(_)));
        assert!(err.is_transient());
    }
}
