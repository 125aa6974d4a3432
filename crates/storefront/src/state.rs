//! Application state shared across handlers.

use std::sync::Arc;

use crate::cart::CartStore;
use crate::checkout::{CheckoutService, Clock, Collaborators, SystemClock};
use crate::config::{BackendConfig, StorefrontConfig};
use crate::services::sandbox::{LogAnalytics, SandboxInventory, SandboxPayments, SandboxShipping};
use crate::services::{
    AnalyticsBackend, AnalyticsClient, InventoryBackend, InventoryClient, PaymentBackend, PaymentClient,
    ServiceError, ShippingBackend, ShippingClient,
};

/// The checkout service as wired by the storefront.
pub type StorefrontCheckout = CheckoutService<InventoryBackend, PaymentBackend, ShippingBackend, AnalyticsBackend>;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// cart store, the checkout service and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    checkout: StorefrontCheckout,
    sandbox_inventory: Option<SandboxInventory>,
}

impl AppState {
    /// Create a new application state, building the configured backends.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ServiceError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`AppState::new`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn with_clock(config: StorefrontConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        let settings = config.checkout.settings();

        let (collaborators, sandbox_inventory) = match &config.backend {
            BackendConfig::Sandbox => {
                let inventory = SandboxInventory::new(settings.reservation_ttl, Arc::clone(&clock));
                let collaborators = Collaborators {
                    inventory: InventoryBackend::Sandbox(inventory.clone()),
                    payments: PaymentBackend::Sandbox(SandboxPayments::default()),
                    shipping: ShippingBackend::Sandbox(SandboxShipping::new(config.checkout.currency)),
                    analytics: AnalyticsBackend::Log(LogAnalytics),
                };
                (collaborators, Some(inventory))
            }
            BackendConfig::Http(http) => {
                let analytics = match &http.analytics_url {
                    Some(url) => AnalyticsBackend::Http(AnalyticsClient::new(url, http.analytics_key.as_ref())?),
                    None => AnalyticsBackend::Log(LogAnalytics),
                };
                let collaborators = Collaborators {
                    inventory: InventoryBackend::Http(InventoryClient::new(
                        http.inventory_url.clone(),
                        http.inventory_key.as_ref(),
                    )?),
                    payments: PaymentBackend::Http(PaymentClient::new(
                        http.payments_url.clone(),
                        &http.payments_key,
                    )?),
                    shipping: ShippingBackend::Http(ShippingClient::new(
                        http.shipping_url.clone(),
                        http.shipping_key.as_ref(),
                    )?),
                    analytics,
                };
                (collaborators, None)
            }
        };

        let checkout = CheckoutService::new(CartStore::new(), collaborators, settings, clock);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                checkout,
                sandbox_inventory,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the checkout service.
    #[must_use]
    pub fn checkout(&self) -> &StorefrontCheckout {
        &self.inner.checkout
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn carts(&self) -> &CartStore {
        self.inner.checkout.carts()
    }

    /// The in-process inventory ledger, when running on the sandbox backend.
    #[must_use]
    pub fn sandbox_inventory(&self) -> Option<&SandboxInventory> {
        self.inner.sandbox_inventory.as_ref()
    }
}
