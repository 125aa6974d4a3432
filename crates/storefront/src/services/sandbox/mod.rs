//! In-process stand-ins for the external services.
//!
//! Used for local development (`CHECKOUT_BACKEND=sandbox`), the CLI and the
//! integration tests. They keep their state in memory and behave like the
//! real APIs on the paths the checkout exercises: all-or-nothing stock holds
//! with expiry, declining test cards, and per-state sales tax.

mod inventory;
mod payment;
mod shipping;

pub use inventory::SandboxInventory;
pub use payment::{DECLINED_TEST_METHODS, SandboxPayments};
pub use shipping::SandboxShipping;

use super::{AnalyticsSink, CheckoutEvent};

/// Analytics sink that writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn track(&self, event: CheckoutEvent) {
        tracing::info!(
            event = event.name(),
            session_id = %event.session_id(),
            "analytics event"
        );
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
