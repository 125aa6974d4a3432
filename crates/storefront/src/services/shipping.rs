//! Shipping rate and sales tax client.
//!
//! Rates come back as fixed amounts in cents with a delivery window; tax is
//! returned in major units and rounded on arrival.

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;
use veloura_core::{Address, CurrencyCode, Price, ShippingRateId};

use super::sandbox::SandboxShipping;
use super::{
    DeliveryEstimate, EtaUnit, ServiceError, ShippingRate, ShippingTaxService, build_http_client, endpoint,
    post_json,
};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireAddress<'a> {
    line1: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line2: Option<&'a str>,
    city: &'a str,
    state: &'a str,
    postal_code: &'a str,
    country: &'a str,
}

impl<'a> From<&'a Address> for WireAddress<'a> {
    fn from(address: &'a Address) -> Self {
        Self {
            line1: &address.address1,
            line2: address.address2.as_deref(),
            city: &address.city,
            state: &address.state,
            postal_code: &address.zip_code,
            country: &address.country,
        }
    }
}

#[derive(Serialize)]
struct RatesRequest<'a> {
    address: WireAddress<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RatesResponse {
    shipping_rates: Vec<WireRate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRate {
    id: ShippingRateId,
    display_name: String,
    fixed_amount: WireAmount,
    delivery_estimate: WireEstimate,
}

#[derive(Deserialize)]
struct WireAmount {
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct WireEstimate {
    minimum: WireBound,
    maximum: WireBound,
}

#[derive(Deserialize)]
struct WireBound {
    unit: EtaUnit,
    value: u32,
}

#[derive(Serialize)]
struct TaxRequest<'a> {
    address: WireAddress<'a>,
    amount: Decimal,
}

#[derive(Deserialize)]
struct TaxResponse {
    tax: Decimal,
}

impl WireRate {
    fn into_rate(self) -> Result<ShippingRate, ServiceError> {
        let WireAmount { amount, currency } = self.fixed_amount;
        if amount < 0 {
            return Err(ServiceError::Malformed(format!("rate {} has negative amount", self.id)));
        }
        let currency = CurrencyCode::parse(&currency)
            .ok_or_else(|| ServiceError::Malformed(format!("unknown currency {currency}")))?;

        let WireEstimate { minimum, maximum } = self.delivery_estimate;
        if minimum.unit != maximum.unit || minimum.value > maximum.value {
            return Err(ServiceError::Malformed(format!(
                "rate {} has an inconsistent delivery window",
                self.id
            )));
        }

        Ok(ShippingRate {
            id: self.id,
            display_name: self.display_name,
            amount: Price::from_minor_units(amount, currency),
            eta: DeliveryEstimate {
                min: minimum.value,
                max: maximum.value,
                unit: minimum.unit,
            },
        })
    }
}

fn tax_from_wire(tax: Decimal, currency: CurrencyCode) -> Result<Price, ServiceError> {
    Price::non_negative(tax, currency).map_err(|e| ServiceError::Malformed(format!("tax: {e}")))
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the shipping and tax API.
#[derive(Clone)]
pub struct ShippingClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ShippingClient {
    /// Create a new shipping client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url, api_key: Option<&SecretString>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(api_key)?,
            base_url,
        })
    }
}

impl ShippingTaxService for ShippingClient {
    #[instrument(skip(self, address), fields(state = %address.state))]
    async fn rates(&self, address: &Address) -> Result<Vec<ShippingRate>, ServiceError> {
        let url = endpoint(&self.base_url, "/shipping/rates");
        let body = RatesRequest {
            address: address.into(),
        };
        let response: RatesResponse = post_json(&self.client, &url, &body).await?;
        response
            .shipping_rates
            .into_iter()
            .map(WireRate::into_rate)
            .collect()
    }

    #[instrument(skip(self, address), fields(state = %address.state, taxable = %taxable))]
    async fn tax(&self, address: &Address, taxable: Price) -> Result<Price, ServiceError> {
        let url = endpoint(&self.base_url, "/tax/calculate");
        let body = TaxRequest {
            address: address.into(),
            amount: taxable.amount,
        };
        let response: TaxResponse = post_json(&self.client, &url, &body).await?;
        tax_from_wire(response.tax, taxable.currency_code)
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Shipping/tax implementation chosen at startup.
#[derive(Clone)]
pub enum ShippingBackend {
    Http(ShippingClient),
    Sandbox(SandboxShipping),
}

impl ShippingTaxService for ShippingBackend {
    async fn rates(&self, address: &Address) -> Result<Vec<ShippingRate>, ServiceError> {
        match self {
            Self::Http(client) => client.rates(address).await,
            Self::Sandbox(sandbox) => sandbox.rates(address).await,
        }
    }

    async fn tax(&self, address: &Address, taxable: Price) -> Result<Price, ServiceError> {
        match self {
            Self::Http(client) => client.tax(address, taxable).await,
            Self::Sandbox(sandbox) => sandbox.tax(address, taxable).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_response_is_validated() {
        let response: RatesResponse = serde_json::from_str(
            r#"{"shippingRates":[{
                "id":"express","displayName":"Express Shipping",
                "fixedAmount":{"amount":1000,"currency":"usd"},
                "deliveryEstimate":{"minimum":{"unit":"day","value":2},"maximum":{"unit":"day","value":3}}
            }]}"#,
        )
        .unwrap();
        let rates: Vec<_> = response
            .shipping_rates
            .into_iter()
            .map(WireRate::into_rate)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rates[0].amount, Price::from_minor_units(1000, CurrencyCode::USD));
        assert_eq!(rates[0].eta, DeliveryEstimate { min: 2, max: 3, unit: EtaUnit::Day });
    }

    #[test]
    fn test_negative_rate_is_malformed() {
        let rate: WireRate = serde_json::from_str(
            r#"{"id":"x","displayName":"X","fixedAmount":{"amount":-5,"currency":"usd"},
                "deliveryEstimate":{"minimum":{"unit":"day","value":1},"maximum":{"unit":"day","value":2}}}"#,
        )
        .unwrap();
        assert!(matches!(rate.into_rate(), Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn test_tax_accepts_numbers_and_rounds() {
        let response: TaxResponse = serde_json::from_str(r#"{"tax":6.815}"#).unwrap();
        let tax = tax_from_wire(response.tax, CurrencyCode::USD).unwrap();
        assert_eq!(tax, Price::from_minor_units(682, CurrencyCode::USD));

        assert!(tax_from_wire(Decimal::new(-1, 0), CurrencyCode::USD).is_err());
    }

    #[test]
    fn test_wire_address_shape() {
        let address = Address {
            address1: "1 Main St".into(),
            city: "Austin".into(),
            state: "TX".into(),
            zip_code: "73301".into(),
            ..Address::default()
        };
        let json = serde_json::to_value(WireAddress::from(&address)).unwrap();
        assert_eq!(json["line1"], "1 Main St");
        assert_eq!(json["postalCode"], "73301");
        assert_eq!(json["country"], "US");
        assert!(json.get("line2").is_none());
    }
}
