//! Type-safe price representation using decimal arithmetic.
//!
//! All checkout amounts are carried as [`Price`] values. Amounts are normalised
//! to the currency's minor-unit precision whenever they enter the system, so
//! sums of prices never drift by fractions of a cent.

use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by price arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    /// Two prices in different currencies were combined.
    #[error("currency mismatch: {left:?} vs {right:?}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },
    /// The result does not fit in a decimal.
    #[error("price arithmetic overflow")]
    Overflow,
    /// A negative amount was supplied where only non-negative amounts are valid.
    #[error("negative amount: {0}")]
    Negative(Decimal),
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price, rounding the amount to the currency's minor units.
    #[must_use]
    pub fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount: currency_code.round(amount),
            currency_code,
        }
    }

    /// Create a non-negative price, rejecting negative amounts.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `amount` is below zero.
    pub fn non_negative(amount: Decimal, currency_code: CurrencyCode) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self::new(amount, currency_code))
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency_code,
        }
    }

    /// Create a price from an integer count of minor units (e.g., cents).
    #[must_use]
    pub fn from_minor_units(units: i64, currency_code: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(units, currency_code.minor_unit_exponent()),
            currency_code,
        }
    }

    /// The amount as an integer count of minor units (e.g., cents).
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i64> {
        let scale = Decimal::from(10_i64.pow(self.currency_code.minor_unit_exponent()));
        self.amount.checked_mul(scale)?.trunc().to_i64()
    }

    /// Returns true if the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Add two prices of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, PriceError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(PriceError::Overflow)?;
        Ok(Self::new(amount, self.currency_code))
    }

    /// Multiply a unit price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the product does not fit.
    pub fn checked_times(self, quantity: u32) -> Result<Self, PriceError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or(PriceError::Overflow)?;
        Ok(Self::new(amount, self.currency_code))
    }

    /// Sum an iterator of prices, starting from zero in `currency_code`.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or overflow.
    pub fn sum<I>(currency_code: CurrencyCode, prices: I) -> Result<Self, PriceError>
    where
        I: IntoIterator<Item = Self>,
    {
        prices
            .into_iter()
            .try_fold(Self::zero(currency_code), Self::checked_add)
    }

    fn ensure_same_currency(self, other: Self) -> Result<(), PriceError> {
        if self.currency_code != other.currency_code {
            return Err(PriceError::CurrencyMismatch {
                left: self.currency_code,
                right: other.currency_code,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency_code.code())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Number of decimal places in the currency's minor unit.
    #[must_use]
    pub const fn minor_unit_exponent(self) -> u32 {
        match self {
            Self::USD | Self::EUR | Self::GBP | Self::CAD | Self::AUD => 2,
        }
    }

    /// Round an amount to this currency's minor-unit precision.
    #[must_use]
    pub fn round(self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(
            self.minor_unit_exponent(),
            RoundingStrategy::MidpointAwayFromZero,
        )
    }

    /// Upper-case ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    /// Lower-case ISO code, as payment processors expect it.
    #[must_use]
    pub const fn wire_code(self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }

    /// Parse a currency code, case-insensitively.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "CAD" => Some(Self::CAD),
            "AUD" => Some(Self::AUD),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn usd(cents: i64) -> Price {
        Price::from_minor_units(cents, CurrencyCode::USD)
    }

    #[test]
    fn test_new_rounds_to_cents() {
        let price = Price::new(Decimal::new(12_345, 3), CurrencyCode::USD);
        assert_eq!(price.amount, Decimal::new(1235, 2));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(usd(2800).amount, Decimal::from(28));
        assert_eq!(usd(599).to_minor_units(), Some(599));
        assert_eq!(Price::zero(CurrencyCode::EUR).to_minor_units(), Some(0));
    }

    #[test]
    fn test_checked_times_and_sum() {
        let line = usd(2800).checked_times(2).unwrap();
        let total = Price::sum(CurrencyCode::USD, [line, usd(2800)]).unwrap();
        assert_eq!(total, usd(8400));
    }

    #[test]
    fn test_currency_mismatch() {
        let eur = Price::from_minor_units(100, CurrencyCode::EUR);
        assert!(matches!(
            usd(100).checked_add(eur),
            Err(PriceError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_non_negative() {
        assert!(Price::non_negative(Decimal::new(-1, 2), CurrencyCode::USD).is_err());
        assert!(Price::non_negative(Decimal::ZERO, CurrencyCode::USD).is_ok());
    }

    #[test]
    fn test_sum_of_rounded_parts_is_exact() {
        // 0.1 + 0.2 style drift must not appear
        let parts = [usd(10), usd(20), Price::new(Decimal::new(3333, 4), CurrencyCode::USD)];
        let total = Price::sum(CurrencyCode::USD, parts).unwrap();
        assert_eq!(total.amount, Decimal::new(63, 2));
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(CurrencyCode::parse("usd"), Some(CurrencyCode::USD));
        assert_eq!(CurrencyCode::parse("XYZ"), None);
        assert_eq!(CurrencyCode::GBP.wire_code(), "gbp");
    }

    #[test]
    fn test_display() {
        assert_eq!(usd(8400).to_string(), "84.00 USD");
    }
}
