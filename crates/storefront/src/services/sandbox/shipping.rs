//! Sandbox shipping rates and sales tax.

use rust_decimal::Decimal;
use veloura_core::{Address, CurrencyCode, Price, ShippingRateId};

use crate::services::{DeliveryEstimate, EtaUnit, ServiceError, ShippingRate, ShippingTaxService};

/// State sales tax rates, as fractions.
const STATE_TAX_RATES: [(&str, i64); 4] = [("CA", 725), ("NY", 400), ("TX", 625), ("FL", 600)];

/// Flat rate table with per-state sales tax.
///
/// States missing from the table are tax free.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxShipping {
    currency: CurrencyCode,
}

impl SandboxShipping {
    #[must_use]
    pub const fn new(currency: CurrencyCode) -> Self {
        Self { currency }
    }

    /// Tax rate for a state code, case-insensitive.
    #[must_use]
    pub fn tax_rate(state: &str) -> Decimal {
        let state = state.trim().to_ascii_uppercase();
        STATE_TAX_RATES
            .iter()
            .find(|(code, _)| *code == state)
            .map_or(Decimal::ZERO, |(_, basis_points)| Decimal::new(*basis_points, 4))
    }

    fn rate(&self, id: &str, name: &str, cents: i64, min: u32, max: u32) -> ShippingRate {
        ShippingRate {
            id: ShippingRateId::new(id),
            display_name: name.to_string(),
            amount: Price::from_minor_units(cents, self.currency),
            eta: DeliveryEstimate {
                min,
                max,
                unit: EtaUnit::Day,
            },
        }
    }
}

impl ShippingTaxService for SandboxShipping {
    async fn rates(&self, address: &Address) -> Result<Vec<ShippingRate>, ServiceError> {
        if address.country.trim().is_empty() {
            return Err(ServiceError::Api {
                status: 422,
                message: "address country is required".into(),
            });
        }
        Ok(vec![
            self.rate("standard", "Standard Shipping", 0, 5, 7),
            self.rate("express", "Express Shipping", 1000, 2, 3),
            self.rate("overnight", "Overnight Shipping", 2500, 1, 1),
        ])
    }

    async fn tax(&self, address: &Address, taxable: Price) -> Result<Price, ServiceError> {
        let rate = Self::tax_rate(&address.state);
        let tax = taxable
            .amount
            .checked_mul(rate)
            .ok_or_else(|| ServiceError::Malformed("tax overflow".into()))?;
        Ok(Price::new(tax, taxable.currency_code))
    }
}
