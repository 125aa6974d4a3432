//! Veloura Core - Shared checkout domain types.
//!
//! This crate provides the types shared by all Veloura components:
//! - `storefront` - Checkout service (cart, checkout wizard, order placement)
//! - `cli` - Command-line tools for quoting and exercising checkouts
//!
//! # Architecture
//!
//! The core crate contains only types and pure validation - no I/O, no HTTP
//! clients, no clocks. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, decimal prices, addresses, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
