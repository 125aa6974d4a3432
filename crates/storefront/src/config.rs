//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Backends
//! - `CHECKOUT_BACKEND` - `sandbox` (default) or `http`
//!
//! With `CHECKOUT_BACKEND=http` these are required:
//! - `INVENTORY_API_URL` - Inventory service base URL
//! - `PAYMENTS_API_URL` - Payment processor base URL
//! - `PAYMENTS_API_KEY` - Payment processor secret key (high entropy)
//! - `SHIPPING_API_URL` - Shipping rate and tax service base URL
//!
//! and these are optional:
//! - `INVENTORY_API_KEY` - Bearer token for the inventory service
//! - `SHIPPING_API_KEY` - Bearer token for the shipping service
//! - `ANALYTICS_API_URL` - Analytics collector (events are logged when unset)
//! - `ANALYTICS_API_KEY` - Bearer token for the analytics collector
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `CHECKOUT_CURRENCY` - Currency for new carts (default: USD)
//! - `RESERVATION_TTL_SECS` - Inventory hold lifetime (default: 900)
//! - `CHECKOUT_SESSION_IDLE_SECS` - Abandonment window (default: 3600)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;
use veloura_core::CurrencyCode;

use crate::checkout::CheckoutSettings;

const MIN_API_KEY_LENGTH: usize = 16;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Which collaborator implementations to use
    pub backend: BackendConfig,
    /// Checkout tunables
    pub checkout: CheckoutConfig,
    /// Error tracking
    pub sentry: SentryConfig,
}

/// Collaborator selection.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// In-process inventory, payments and shipping.
    Sandbox,
    /// Remote services over HTTP.
    Http(HttpBackends),
}

/// Remote service endpoints.
///
/// Implements `Debug` manually to redact keys.
#[derive(Clone)]
pub struct HttpBackends {
    pub inventory_url: Url,
    pub inventory_key: Option<SecretString>,
    pub payments_url: Url,
    pub payments_key: SecretString,
    pub shipping_url: Url,
    pub shipping_key: Option<SecretString>,
    pub analytics_url: Option<Url>,
    pub analytics_key: Option<SecretString>,
}

impl std::fmt::Debug for HttpBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<SecretString>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("HttpBackends")
            .field("inventory_url", &self.inventory_url.as_str())
            .field("inventory_key", &redact(&self.inventory_key))
            .field("payments_url", &self.payments_url.as_str())
            .field("payments_key", &"[REDACTED]")
            .field("shipping_url", &self.shipping_url.as_str())
            .field("shipping_key", &redact(&self.shipping_key))
            .field("analytics_url", &self.analytics_url.as_ref().map(Url::as_str))
            .field("analytics_key", &redact(&self.analytics_key))
            .finish()
    }
}

/// Checkout tunables.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutConfig {
    /// Currency new carts are priced in
    pub currency: CurrencyCode,
    /// How long an inventory hold may live before commit
    pub reservation_ttl: Duration,
    /// Idle time after which a checkout session is dropped
    pub session_idle: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            reservation_ttl: Duration::from_secs(15 * 60),
            session_idle: Duration::from_secs(60 * 60),
        }
    }
}

impl CheckoutConfig {
    /// Settings handed to the checkout service.
    #[must_use]
    pub fn settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            reservation_ttl: chrono::Duration::from_std(self.reservation_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(15)),
            session_idle: self.session_idle,
        }
    }
}

/// Sentry options.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_vars(&EnvVars::process())
    }

    fn from_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        let host = vars.parse_or("STOREFRONT_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = vars.parse_or("STOREFRONT_PORT", 3000_u16)?;

        let backend = match vars.get("CHECKOUT_BACKEND").as_deref().unwrap_or("sandbox") {
            "sandbox" => BackendConfig::Sandbox,
            "http" => BackendConfig::Http(HttpBackends::from_vars(vars)?),
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "CHECKOUT_BACKEND".to_string(),
                    format!("expected 'sandbox' or 'http', got '{other}'"),
                ));
            }
        };

        Ok(Self {
            host,
            port,
            backend,
            checkout: CheckoutConfig::from_vars(vars)?,
            sentry: SentryConfig::from_vars(vars)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl HttpBackends {
    fn from_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        let payments_key = vars.required("PAYMENTS_API_KEY")?;
        validate_secret_strength(&payments_key, "PAYMENTS_API_KEY")?;
        let payments_key = SecretString::from(payments_key);
        validate_key_length(&payments_key, "PAYMENTS_API_KEY")?;

        Ok(Self {
            inventory_url: vars.required_url("INVENTORY_API_URL")?,
            inventory_key: vars.get("INVENTORY_API_KEY").map(SecretString::from),
            payments_url: vars.required_url("PAYMENTS_API_URL")?,
            payments_key,
            shipping_url: vars.required_url("SHIPPING_API_URL")?,
            shipping_key: vars.get("SHIPPING_API_KEY").map(SecretString::from),
            analytics_url: vars
                .get("ANALYTICS_API_URL")
                .map(|raw| parse_url("ANALYTICS_API_URL", &raw))
                .transpose()?,
            analytics_key: vars.get("ANALYTICS_API_KEY").map(SecretString::from),
        })
    }
}

impl CheckoutConfig {
    fn from_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let currency = match vars.get("CHECKOUT_CURRENCY") {
            Some(code) => CurrencyCode::parse(&code).ok_or_else(|| {
                ConfigError::InvalidEnvVar("CHECKOUT_CURRENCY".to_string(), format!("unsupported currency '{code}'"))
            })?,
            None => defaults.currency,
        };
        let reservation_ttl = vars.parse_or("RESERVATION_TTL_SECS", defaults.reservation_ttl.as_secs())?;
        let session_idle = vars.parse_or("CHECKOUT_SESSION_IDLE_SECS", defaults.session_idle.as_secs())?;
        for (key, secs) in [
            ("RESERVATION_TTL_SECS", reservation_ttl),
            ("CHECKOUT_SESSION_IDLE_SECS", session_idle),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidEnvVar(key.to_string(), "must be positive".to_string()));
            }
        }

        Ok(Self {
            currency,
            reservation_ttl: Duration::from_secs(reservation_ttl),
            session_idle: Duration::from_secs(session_idle),
        })
    }
}

impl SentryConfig {
    fn from_vars(vars: &EnvVars) -> Result<Self, ConfigError> {
        let sample_rate = vars.parse_or("SENTRY_SAMPLE_RATE", 1.0_f32)?;
        let traces_sample_rate = vars.parse_or("SENTRY_TRACES_SAMPLE_RATE", 0.0_f32)?;
        for (key, rate) in [
            ("SENTRY_SAMPLE_RATE", sample_rate),
            ("SENTRY_TRACES_SAMPLE_RATE", traces_sample_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidEnvVar(
                    key.to_string(),
                    format!("must be between 0 and 1 (got {rate})"),
                ));
            }
        }

        Ok(Self {
            dsn: vars.get("SENTRY_DSN"),
            environment: vars.get("SENTRY_ENVIRONMENT"),
            sample_rate,
            traces_sample_rate,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Environment lookups. Blank values count as unset.
struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    fn process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Get an optional environment variable.
    fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    }

    /// Get a required environment variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn required_url(&self, key: &str) -> Result<Url, ConfigError> {
        parse_url(key, &self.required(key)?)
    }

    /// Parse an environment variable, falling back to `default` when unset.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// Validate that an API key meets minimum length requirements.
fn validate_key_length(key: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = key.expose_secret();
    if value.len() < MIN_API_KEY_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_API_KEY_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
