//! YAML cart files.
//!
//! ```yaml
//! currency: USD
//! items:
//!   - product: ruby-velvet-lipstick
//!     shade: ruby-07
//!     quantity: 2
//!     price: "28.00"
//! customer:
//!   email: glow@veloura.com
//!   firstName: Ada
//!   lastName: Lovelace
//! shipping:
//!   address1: 1 Main St
//!   city: Los Angeles
//!   state: CA
//!   zipCode: "90001"
//! rate: express
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use veloura_core::{Address, CurrencyCode, Price, ProductId, ShadeId, ShippingRateId};
use veloura_storefront::cart::{Cart, CartError, CartLineItem};
use veloura_storefront::checkout::CustomerInfo;

/// Errors loading a cart file.
#[derive(Debug, Error)]
pub enum CartFileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{} validation error(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Deserialize)]
pub struct LineSpec {
    pub product: ProductId,
    #[serde(default)]
    pub shade: Option<ShadeId>,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSpec {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// A cart plus the checkout inputs a dry run needs.
#[derive(Debug, Deserialize)]
pub struct CartFile {
    #[serde(default)]
    pub currency: CurrencyCode,
    pub items: Vec<LineSpec>,
    #[serde(default)]
    pub customer: Option<CustomerSpec>,
    #[serde(default)]
    pub shipping: Option<Address>,
    #[serde(default)]
    pub rate: Option<ShippingRateId>,
}

impl CartFile {
    /// Read and validate a cart file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub async fn load(path: &Path) -> Result<Self, CartFileError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CartFileError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Parse and validate cart YAML.
    ///
    /// # Errors
    ///
    /// Returns `Yaml` for syntax errors and `Invalid` listing every problem
    /// with the lines.
    pub fn parse(content: &str) -> Result<Self, CartFileError> {
        let file: Self = serde_yaml::from_str(content)?;
        let errors = file.validate();
        if !errors.is_empty() {
            return Err(CartFileError::Invalid(errors));
        }
        Ok(file)
    }

    /// Every problem with the file's lines.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.items.is_empty() {
            errors.push("cart has no items".to_string());
        }
        for (index, line) in self.items.iter().enumerate() {
            if let Err(e) = self.line_item(line) {
                errors.push(format!("item {} ({}): {e}", index + 1, line.product));
            }
        }
        errors
    }

    fn line_item(&self, line: &LineSpec) -> Result<CartLineItem, CartError> {
        CartLineItem::new(
            line.product.clone(),
            line.shade.clone(),
            line.quantity,
            Price::non_negative(line.price, self.currency)?,
        )
    }

    /// Fill `cart` with the file's lines.
    ///
    /// # Errors
    ///
    /// Returns the first line that cannot be added.
    pub fn fill(&self, cart: &mut Cart) -> Result<(), CartError> {
        for line in &self.items {
            cart.add(self.line_item(line)?)?;
        }
        Ok(())
    }

    /// Customer details, defaulting to a test customer.
    #[must_use]
    pub fn customer_info(&self) -> CustomerInfo {
        let spec = self.customer.as_ref();
        CustomerInfo {
            email: spec.map_or_else(|| "dry-run@veloura.com".to_string(), |c| c.email.clone()),
            first_name: spec.map_or_else(|| "Dry".to_string(), |c| c.first_name.clone()),
            last_name: spec.map_or_else(|| "Run".to_string(), |c| c.last_name.clone()),
            ..CustomerInfo::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use veloura_core::CartId;

    use super::*;

    const SAMPLE: &str = r#"
currency: USD
items:
  - product: ruby-velvet
    quantity: 2
    price: "28.00"
  - product: golden-hour
    shade: gh-02
    quantity: 1
    price: 28
shipping:
  address1: 1 Main St
  city: Los Angeles
  state: CA
  zipCode: "90001"
rate: express
"#;

    #[test]
    fn test_parse_sample() {
        let file = CartFile::parse(SAMPLE).unwrap();
        assert_eq!(file.items.len(), 2);
        assert_eq!(file.rate, Some(ShippingRateId::new("express")));
        assert_eq!(file.shipping.unwrap().country, "US");
    }

    #[test]
    fn test_fill_builds_cart() {
        let file = CartFile::parse(SAMPLE).unwrap();
        let mut cart = Cart::new(CartId::new("c"), file.currency);
        file.fill(&mut cart).unwrap();
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.subtotal().unwrap(), Price::from_minor_units(8400, CurrencyCode::USD));
    }

    #[test]
    fn test_reports_every_bad_line() {
        let yaml = r#"
items:
  - product: a
    quantity: 0
    price: "1.00"
  - product: b
    quantity: 1
    price: "-5"
"#;
        let Err(CartFileError::Invalid(errors)) = CartFile::parse(yaml) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("item 1 (a)"));
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert!(matches!(
            CartFile::parse("items: []"),
            Err(CartFileError::Invalid(_))
        ));
    }

    #[test]
    fn test_default_customer() {
        let file = CartFile::parse(SAMPLE).unwrap();
        assert_eq!(file.customer_info().email, "dry-run@veloura.com");
    }
}
