//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Responses are JSON: `{"error": "...", "code": "..."}`, plus the unavailable
//! lines when a reservation is rejected. The message is always the sanitized
//! shopper-facing text, never the upstream detail.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::cart::CartError;
use crate::checkout::{CheckoutError, PlacementError, PricingError, SnapshotError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(err) => checkout_status(err),
            Self::Cart(err) => cart_status(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Checkout(err) => checkout_code(err),
            Self::Cart(CartError::NotFound(_)) => "cart_not_found",
            Self::Cart(_) | Self::BadRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Checkout(err) => err.user_message(),
            Self::Cart(err) => CheckoutError::Cart(err.clone()).user_message(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

const fn cart_status(err: &CartError) -> StatusCode {
    match err {
        CartError::NotFound(_) | CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
        CartError::InvalidQuantity(_) | CartError::CurrencyMismatch { .. } | CartError::Price(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

const fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::Cart(err) => cart_status(err),
        CheckoutError::Snapshot(SnapshotError::EmptyCart | SnapshotError::NothingToCharge)
        | CheckoutError::Pricing(PricingError::UnknownRate(_)) => StatusCode::BAD_REQUEST,
        CheckoutError::WrongStep { .. }
        | CheckoutError::SessionClosed(_)
        | CheckoutError::Transition(_)
        | CheckoutError::InProgress
        | CheckoutError::Placement(
            PlacementError::InventoryUnavailable(_)
            | PlacementError::ReservationExpired { .. }
            | PlacementError::CommitFailed { .. },
        ) => StatusCode::CONFLICT,
        CheckoutError::Placement(PlacementError::PaymentDeclined { .. }) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::Pricing(PricingError::Arithmetic(_))
        | CheckoutError::Snapshot(SnapshotError::Price(_))
        | CheckoutError::Placement(PlacementError::ContractViolation(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        CheckoutError::Pricing(_)
        | CheckoutError::Service(_)
        | CheckoutError::Placement(PlacementError::ServiceUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

const fn checkout_code(err: &CheckoutError) -> &'static str {
    match err {
        CheckoutError::SessionNotFound(_) => "session_not_found",
        CheckoutError::Cart(CartError::NotFound(_)) => "cart_not_found",
        CheckoutError::Snapshot(SnapshotError::EmptyCart) => "cart_empty",
        CheckoutError::Snapshot(SnapshotError::NothingToCharge) => "nothing_to_charge",
        CheckoutError::WrongStep { .. } | CheckoutError::Transition(_) => "wrong_step",
        CheckoutError::SessionClosed(_) => "session_closed",
        CheckoutError::InProgress => "in_progress",
        CheckoutError::Pricing(PricingError::UnknownRate(_)) => "unknown_shipping_rate",
        CheckoutError::Placement(PlacementError::InventoryUnavailable(_)) => "inventory_unavailable",
        CheckoutError::Placement(PlacementError::PaymentDeclined { .. }) => "payment_declined",
        CheckoutError::Placement(PlacementError::ReservationExpired { .. } | PlacementError::CommitFailed { .. }) => {
            "order_not_completed"
        }
        CheckoutError::Cart(_) => "invalid_request",
        _ if err.is_internal() => "internal_error",
        _ => "service_unavailable",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut body = json!({
            "error": self.message(),
            "code": self.code(),
        });
        if let Self::Checkout(CheckoutError::Placement(PlacementError::InventoryUnavailable(lines))) = &self {
            body["unavailable"] = json!(lines);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for checkout actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use veloura_core::{CartId, ProductId, SessionId, SessionStatus};

    use super::*;
    use crate::checkout::CheckoutStep;
    use crate::services::{ServiceError, UnavailableLine};

    fn get_status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(CheckoutError::SessionNotFound(SessionId::new("s"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(CartError::NotFound(CartId::new("c"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(get_status(CartError::InvalidQuantity(0)), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_status(CheckoutError::WrongStep {
                expected: CheckoutStep::Shipping,
                actual: CheckoutStep::CustomerInfo,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(CheckoutError::InProgress), StatusCode::CONFLICT);
        assert_eq!(
            get_status(CheckoutError::SessionClosed(SessionStatus::Aborted)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CheckoutError::Placement(PlacementError::InventoryUnavailable(vec![]))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CheckoutError::Service(ServiceError::RateLimited(5))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(CheckoutError::Placement(PlacementError::ContractViolation("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(AppError::from(CheckoutError::InProgress).code(), "in_progress");
        assert_eq!(
            AppError::from(CheckoutError::Placement(PlacementError::ContractViolation("x".into()))).code(),
            "internal_error"
        );
        assert_eq!(
            AppError::from(CheckoutError::Service(ServiceError::Malformed("x".into()))).code(),
            "service_unavailable"
        );
    }

    #[test]
    fn test_free_cart_is_a_bad_request() {
        let err = AppError::from(CheckoutError::Snapshot(SnapshotError::NothingToCharge));
        assert_eq!(err.code(), "nothing_to_charge");
        assert_eq!(get_status(CheckoutError::Snapshot(SnapshotError::NothingToCharge)), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_message_is_sanitized() {
        let err = AppError::from(CheckoutError::Service(ServiceError::Api {
            status: 500,
            message: "upstream stack trace".into(),
        }));
        assert!(!err.message().contains("stack trace"));
        assert_eq!(AppError::Internal("db exploded".into()).message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_inventory_body_lists_lines() {
        let err = AppError::from(CheckoutError::Placement(PlacementError::InventoryUnavailable(vec![
            UnavailableLine {
                product_id: ProductId::new("ruby-velvet"),
                shade_id: None,
                requested: 2,
                reason: "insufficient_stock".into(),
            },
        ])));
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap_or_default();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
        assert_eq!(body["code"], "inventory_unavailable");
        assert_eq!(body["unavailable"][0]["productId"], "ruby-velvet");
    }
}
