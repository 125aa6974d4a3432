//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                               - Health check
//!
//! # Cart
//! POST   /cart                                 - Create cart
//! GET    /cart/{cart_id}                       - Show cart
//! POST   /cart/{cart_id}/items                 - Add line
//! PATCH  /cart/{cart_id}/items                 - Set line quantity (0 removes)
//! DELETE /cart/{cart_id}/items                 - Remove line
//!
//! # Checkout
//! POST   /checkout                             - Start session from a cart
//! GET    /checkout/{session_id}                - Show session
//! DELETE /checkout/{session_id}                - Cancel session
//! PUT    /checkout/{session_id}/customer       - Customer details
//! PUT    /checkout/{session_id}/shipping       - Shipping address and rate
//! GET    /checkout/{session_id}/shipping-rates - Available rates
//! PUT    /checkout/{session_id}/payment        - Payment method and billing
//! POST   /checkout/{session_id}/advance        - Complete current step
//! POST   /checkout/{session_id}/retreat        - Back one step
//! POST   /checkout/{session_id}/retry          - Failed -> payment
//! POST   /checkout/{session_id}/place-order    - Reserve, pay, commit
//! ```

pub mod cart;
pub mod checkout;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(cart::create))
        .route("/{cart_id}", get(cart::show))
        .route(
            "/{cart_id}/items",
            post(cart::add).patch(cart::set_quantity).delete(cart::remove),
        )
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout::start))
        .route("/{session_id}", get(checkout::show).delete(checkout::cancel))
        .route("/{session_id}/customer", put(checkout::update_customer))
        .route("/{session_id}/shipping", put(checkout::update_shipping))
        .route("/{session_id}/shipping-rates", get(checkout::shipping_rates))
        .route("/{session_id}/payment", put(checkout::update_payment))
        .route("/{session_id}/advance", post(checkout::advance))
        .route("/{session_id}/retreat", post(checkout::retreat))
        .route("/{session_id}/retry", post(checkout::retry))
        .route("/{session_id}/place-order", post(checkout::place_order))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
}
