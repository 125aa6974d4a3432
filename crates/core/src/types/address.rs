//! Postal address used for shipping and billing.

use serde::{Deserialize, Serialize};

/// A postal address as entered on the checkout form.
///
/// Fields are stored as entered; required-field validation is the checkout
/// step's job, not the type's, so partially filled addresses can be kept while
/// the customer moves between steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub phone: Option<String>,
}

impl Default for Address {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            company: None,
            address1: String::new(),
            address2: None,
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            country: "US".to_string(),
            phone: None,
        }
    }
}

impl Address {
    /// Names of the required fields that are blank, in form order.
    ///
    /// Required fields are `address1`, `city`, `state` and `zipCode`.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("address1", &self.address1),
            ("city", &self.city),
            ("state", &self.state),
            ("zipCode", &self.zip_code),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Returns true if every required field is filled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_country_is_us() {
        assert_eq!(Address::default().country, "US");
    }

    #[test]
    fn test_missing_required_fields() {
        let address = Address {
            address1: "1 Main St".to_string(),
            city: "   ".to_string(),
            ..Address::default()
        };
        assert_eq!(address.missing_required(), vec!["city", "state", "zipCode"]);
        assert!(!address.is_complete());
    }

    #[test]
    fn test_deserializes_partial_camel_case() {
        let address: Address =
            serde_json::from_str(r#"{"address1":"1 Main St","zipCode":"94110"}"#).unwrap();
        assert_eq!(address.zip_code, "94110");
        assert_eq!(address.country, "US");
    }
}
