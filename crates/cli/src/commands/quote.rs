//! Price a cart file against every sandbox shipping rate.

use std::path::Path;

use chrono::Utc;
use tracing::info;
use veloura_core::CartId;
use veloura_storefront::cart::Cart;
use veloura_storefront::checkout::{CartSnapshot, PricingAccumulator};
use veloura_storefront::services::sandbox::SandboxShipping;

use super::cart_file::CartFile;

/// Print the pricing breakdown for each shipping rate.
///
/// # Errors
///
/// Returns an error if the file is invalid or has no shipping address.
pub async fn run(file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = CartFile::load(file_path).await?;
    let address = file
        .shipping
        .clone()
        .ok_or("cart file has no shipping address")?;

    let mut cart = Cart::new(CartId::generate(), file.currency);
    file.fill(&mut cart)?;
    let snapshot = CartSnapshot::capture(&cart, Utc::now())?;

    let pricing = PricingAccumulator::new(SandboxShipping::new(file.currency));
    let rates = pricing.rates(&address).await?;

    info!(
        items = snapshot.items().len(),
        subtotal = %snapshot.subtotal(),
        state = %address.state,
        "Quote"
    );
    for rate in rates.iter() {
        let breakdown = pricing.recompute(&snapshot, &address, Some(rate)).await?;
        let marker = if file.rate.as_ref() == Some(&rate.id) { " (selected)" } else { "" };
        info!(
            "  {}{marker}: shipping {} + tax {} = {} ({}-{} {:?}s)",
            rate.display_name,
            breakdown.shipping_cost(),
            breakdown.tax(),
            breakdown.total(),
            rate.eta.min,
            rate.eta.max,
            rate.eta.unit,
        );
    }
    Ok(())
}
