//! Checkout orchestration.
//!
//! # Modules
//!
//! - `snapshot` - Frozen copy of the cart a checkout runs against
//! - `step` - Step table, per-step validation and guards
//! - `pricing` - Shipping and tax lookups folded into a price breakdown
//! - `session` - Per-checkout state and its client view
//! - `coordinator` - Reserve, confirm and commit protocol
//! - `service` - Session store tying the pieces together

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod pricing;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod step;

#[cfg(test)]
mod fakes;

pub use clock::{Clock, SystemClock};
pub use coordinator::{Order, PlacementError, ProtocolStage, ReservationCoordinator, ReservationTicket};
pub use error::CheckoutError;
pub use pricing::{PricingAccumulator, PricingBreakdown, PricingError};
pub use service::{AdvanceResult, CheckoutService, CheckoutSettings, Collaborators};
pub use session::{CustomerIdentity, CustomerInfo, PaymentDetails, SessionView, ShippingDetails};
pub use snapshot::{CartSnapshot, SnapshotError};
pub use step::{CheckoutStep, FieldErrors, StepOutcome};
