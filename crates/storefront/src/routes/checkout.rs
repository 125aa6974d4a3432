//! Checkout route handlers.
//!
//! Thin JSON adapters over [`CheckoutService`](crate::checkout::CheckoutService).
//! Field validation problems come back from `advance` as a `200` with an
//! `errors` map; everything else that goes wrong is an [`AppError`].

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use veloura_core::{Address, CartId, PaymentMethodRef, SessionId, ShippingRateId};

use crate::checkout::{
    AdvanceResult, CustomerIdentity, CustomerInfo, Order, PaymentDetails, SessionView, ShippingDetails,
};
use crate::error::{Result, add_breadcrumb};
use crate::services::ShippingRate;
use crate::state::AppState;

/// Body of `POST /checkout`.
///
/// `customer` is set by the authenticating proxy for signed-in shoppers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCheckoutRequest {
    pub cart_id: CartId,
    #[serde(default)]
    pub customer: Option<CustomerIdentity>,
}

/// Body of `PUT /checkout/{session_id}/customer`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub create_account: bool,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for CustomerInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerInput")
            .field("email", &self.email)
            .field("create_account", &self.create_account)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl From<CustomerInput> for CustomerInfo {
    fn from(input: CustomerInput) -> Self {
        Self {
            email: input.email.trim().to_string(),
            first_name: input.first_name,
            last_name: input.last_name,
            phone: input.phone.filter(|p| !p.trim().is_empty()),
            create_account: input.create_account,
            password: input.password.map(SecretString::from),
        }
    }
}

/// Body of `PUT /checkout/{session_id}/shipping`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInput {
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub rate_id: Option<ShippingRateId>,
}

impl From<ShippingInput> for ShippingDetails {
    fn from(input: ShippingInput) -> Self {
        Self {
            address: input.address,
            rate_id: input.rate_id,
        }
    }
}

/// Body of `PUT /checkout/{session_id}/payment`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    #[serde(default)]
    pub method: Option<PaymentMethodRef>,
    #[serde(default = "default_true")]
    pub same_as_shipping: bool,
    #[serde(default)]
    pub billing_address: Address,
}

const fn default_true() -> bool {
    true
}

impl From<PaymentInput> for PaymentDetails {
    fn from(input: PaymentInput) -> Self {
        Self {
            method: input.method,
            same_as_shipping: input.same_as_shipping,
            billing_address: input.billing_address,
        }
    }
}

/// Response of `GET /checkout/{session_id}/shipping-rates`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRatesResponse {
    pub shipping_rates: Vec<ShippingRate>,
}

/// Response of `POST /checkout/{session_id}/place-order`.
#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub order: Order,
}

/// Start a checkout from a cart.
#[instrument(skip(state, req), fields(cart_id = %req.cart_id))]
pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartCheckoutRequest>,
) -> Result<(StatusCode, Json<SessionView>)> {
    let view = state.checkout().start(&req.cart_id, req.customer).await?;
    add_breadcrumb("checkout", "Checkout started", Some(&[("session_id", view.id.as_str())]));
    Ok((StatusCode::CREATED, Json(view)))
}

/// Show a session.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(session_id): Path<SessionId>) -> Result<Json<SessionView>> {
    Ok(Json(state.checkout().get(&session_id).await?))
}

/// Cancel a session.
#[instrument(skip(state))]
pub async fn cancel(State(state): State<AppState>, Path(session_id): Path<SessionId>) -> Result<StatusCode> {
    state.checkout().cancel(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace customer details.
#[instrument(skip(state))]
pub async fn update_customer(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(input): Json<CustomerInput>,
) -> Result<Json<SessionView>> {
    Ok(Json(state.checkout().update_customer(&session_id, input.into()).await?))
}

/// Replace the shipping address and selected rate.
#[instrument(skip(state))]
pub async fn update_shipping(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(input): Json<ShippingInput>,
) -> Result<Json<SessionView>> {
    Ok(Json(state.checkout().update_shipping(&session_id, input.into()).await?))
}

/// Shipping options for the session's address.
#[instrument(skip(state))]
pub async fn shipping_rates(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<ShippingRatesResponse>> {
    let shipping_rates = state.checkout().shipping_rates(&session_id, None).await?;
    Ok(Json(ShippingRatesResponse { shipping_rates }))
}

/// Replace payment fields.
#[instrument(skip(state))]
pub async fn update_payment(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(input): Json<PaymentInput>,
) -> Result<Json<SessionView>> {
    Ok(Json(state.checkout().update_payment(&session_id, input.into()).await?))
}

/// Complete the current step.
#[instrument(skip(state))]
pub async fn advance(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<AdvanceResult>> {
    Ok(Json(state.checkout().advance(&session_id).await?))
}

/// Go back one step.
#[instrument(skip(state))]
pub async fn retreat(State(state): State<AppState>, Path(session_id): Path<SessionId>) -> Result<Json<SessionView>> {
    Ok(Json(state.checkout().retreat(&session_id).await?))
}

/// Return a failed checkout to the payment step.
#[instrument(skip(state))]
pub async fn retry(State(state): State<AppState>, Path(session_id): Path<SessionId>) -> Result<Json<SessionView>> {
    Ok(Json(state.checkout().retry(&session_id).await?))
}

/// Place the order.
#[instrument(skip(state))]
pub async fn place_order(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>)> {
    let order = state.checkout().place_order(&session_id).await?;
    add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order.id().as_str())]));
    tracing::info!(order_id = %order.id(), total = %order.pricing().total(), "order placed");
    Ok((StatusCode::CREATED, Json(PlaceOrderResponse { order })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_customer_input_keeps_password_secret() {
        let input: CustomerInput = serde_json::from_value(serde_json::json!({
            "email": " glow@veloura.com ",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "createAccount": true,
            "password": "correct horse"
        }))
        .unwrap();
        assert!(!format!("{input:?}").contains("correct horse"));

        let info = CustomerInfo::from(input);
        assert_eq!(info.email, "glow@veloura.com");
        assert_eq!(info.password.unwrap().expose_secret(), "correct horse");
    }

    #[test]
    fn test_payment_input_defaults_to_same_as_shipping() {
        let input: PaymentInput = serde_json::from_value(serde_json::json!({
            "method": "pm_card_visa"
        }))
        .unwrap();
        assert!(input.same_as_shipping);
        assert_eq!(PaymentDetails::from(input).method, Some(PaymentMethodRef::new("pm_card_visa")));
    }

    #[test]
    fn test_shipping_input_address_fields() {
        let input: ShippingInput = serde_json::from_value(serde_json::json!({
            "address": {"address1": "1 Main St", "city": "Portland", "state": "OR", "zipCode": "97201"},
            "rateId": "express"
        }))
        .unwrap();
        let details = ShippingDetails::from(input);
        assert_eq!(details.address.zip_code, "97201");
        assert_eq!(details.address.country, "US");
        assert_eq!(details.rate_id, Some(ShippingRateId::new("express")));
    }
}
