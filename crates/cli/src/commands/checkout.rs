//! Run a full checkout of a cart file against the sandbox backends.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use tracing::{error, info, warn};
use veloura_core::{PaymentMethodRef, SessionId};
use veloura_storefront::checkout::{
    CheckoutError, CheckoutStep, PaymentDetails, PricingBreakdown, ShippingDetails,
};
use veloura_storefront::config::{BackendConfig, CheckoutConfig, SentryConfig, StorefrontConfig};
use veloura_storefront::state::{AppState, StorefrontCheckout};

use super::cart_file::CartFile;

/// Dry-run options.
#[derive(Debug)]
pub struct DryRun<'a> {
    pub file_path: &'a Path,
    pub payment_method: &'a str,
    /// Stock level for every line; the sandbox default when unset.
    pub stock: Option<u32>,
}

fn sandbox_state(file: &CartFile) -> Result<AppState, Box<dyn std::error::Error>> {
    let config = StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        backend: BackendConfig::Sandbox,
        checkout: CheckoutConfig {
            currency: file.currency,
            ..CheckoutConfig::default()
        },
        sentry: SentryConfig::default(),
    };
    Ok(AppState::new(config)?)
}

/// Walk the cart through every step and place the order.
///
/// # Errors
///
/// Returns an error if the file is invalid, a step is rejected, or the order
/// cannot be placed.
pub async fn run(options: DryRun<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let file = CartFile::load(options.file_path).await?;
    let address = file
        .shipping
        .clone()
        .ok_or("cart file has no shipping address")?;
    let rate_id = file.rate.clone().ok_or("cart file has no shipping rate")?;

    let state = sandbox_state(&file)?;
    if let (Some(stock), Some(inventory)) = (options.stock, state.sandbox_inventory()) {
        for line in &file.items {
            inventory.set_stock(&line.product, line.shade.as_ref(), stock);
        }
    }

    let cart = state.carts().create(file.currency).await;
    state.carts().update(cart.id(), |c| file.fill(c)).await?;

    let checkout = state.checkout();
    let session = checkout.start(cart.id(), None).await?;
    info!(session_id = %session.id, subtotal = %session.cart.subtotal(), "Checkout started");

    checkout.update_customer(&session.id, file.customer_info()).await?;
    step(checkout, &session.id).await?;

    checkout
        .update_shipping(
            &session.id,
            ShippingDetails {
                address,
                rate_id: Some(rate_id),
            },
        )
        .await?;
    step(checkout, &session.id).await?;

    checkout
        .update_payment(
            &session.id,
            PaymentDetails {
                method: Some(PaymentMethodRef::new(options.payment_method)),
                ..PaymentDetails::default()
            },
        )
        .await?;
    let review = step(checkout, &session.id).await?;
    if let Some(pricing) = review {
        info!(
            subtotal = %pricing.subtotal(),
            shipping = %pricing.shipping_cost(),
            tax = %pricing.tax(),
            total = %pricing.total(),
            "Review"
        );
    }

    match checkout.place_order(&session.id).await {
        Ok(order) => {
            info!(order_id = %order.id(), ticket = %order.ticket_id(), payment = order.payment_ref(), "Order placed");
            info!("{}", serde_json::to_string_pretty(&order)?);
            Ok(())
        }
        Err(CheckoutError::Placement(failure)) => {
            error!(error = %failure, "Order not placed");
            if let Some(ticket) = failure.ticket() {
                warn!(ticket = %ticket.id(), status = ?ticket.status(), "Reservation outcome");
            }
            Err(failure.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Advance one step, failing on field errors.
async fn step(
    checkout: &StorefrontCheckout,
    session_id: &SessionId,
) -> Result<Option<PricingBreakdown>, Box<dyn std::error::Error>> {
    let result = checkout.advance(session_id).await?;
    if result.outcome.is_rejected() {
        for (field, message) in &result.outcome.errors {
            error!("  - {field}: {message}");
        }
        return Err(format!("{:?} step rejected", result.session.step).into());
    }
    info!(step = ?result.outcome.next_step, "Advanced");
    Ok((result.outcome.next_step == CheckoutStep::Review)
        .then_some(result.session.pricing)
        .flatten())
}
