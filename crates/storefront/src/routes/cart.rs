//! Cart route handlers.
//!
//! Carts are plain JSON resources. A checkout started from a cart works on a
//! snapshot, so edits here never reach a checkout already in progress.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use veloura_core::{CartId, CurrencyCode, Price, ProductId, ShadeId};

use crate::cart::{Cart, CartLineItem};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Cart as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub item_count: u32,
    pub subtotal: Price,
}

impl TryFrom<Cart> for CartView {
    type Error = AppError;

    fn try_from(cart: Cart) -> Result<Self> {
        let subtotal = cart
            .subtotal()
            .map_err(|e| AppError::Internal(format!("cart subtotal: {e}")))?;
        Ok(Self {
            item_count: cart.item_count(),
            subtotal,
            cart,
        })
    }
}

/// Body of `POST /cart`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateCartRequest {
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
}

/// Body of `PATCH /cart/{cart_id}/items`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub shade_id: Option<ShadeId>,
    pub quantity: u32,
}

/// Body of `DELETE /cart/{cart_id}/items`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveLineRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub shade_id: Option<ShadeId>,
}

/// Create an empty cart.
#[instrument(skip(state))]
pub async fn create(
    State(state): State<AppState>,
    body: Option<Json<CreateCartRequest>>,
) -> Result<(StatusCode, Json<CartView>)> {
    let currency = body
        .and_then(|Json(req)| req.currency)
        .unwrap_or(state.config().checkout.currency);
    let cart = state.carts().create(currency).await;
    tracing::debug!(cart_id = %cart.id(), "cart created");
    Ok((StatusCode::CREATED, Json(cart.try_into()?)))
}

/// Show a cart.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(cart_id): Path<CartId>) -> Result<Json<CartView>> {
    let cart = state.carts().get(&cart_id).await?;
    Ok(Json(cart.try_into()?))
}

/// Add a line, merging with an existing line for the same product and shade.
#[instrument(skip(state))]
pub async fn add(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(line): Json<CartLineItem>,
) -> Result<Json<CartView>> {
    let cart = state.carts().update(&cart_id, |cart| cart.add(line)).await?;
    Ok(Json(cart.try_into()?))
}

/// Change a line's quantity; zero removes it.
#[instrument(skip(state))]
pub async fn set_quantity(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartView>> {
    let cart = state
        .carts()
        .update(&cart_id, |cart| {
            cart.set_quantity(&req.product_id, req.shade_id.as_ref(), req.quantity)
        })
        .await?;
    Ok(Json(cart.try_into()?))
}

/// Remove a line.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(req): Json<RemoveLineRequest>,
) -> Result<Json<CartView>> {
    let cart = state
        .carts()
        .update(&cart_id, |cart| cart.remove(&req.product_id, req.shade_id.as_ref()))
        .await?;
    Ok(Json(cart.try_into()?))
}
