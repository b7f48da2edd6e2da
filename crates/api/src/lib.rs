// API crate clippy configuration
#![allow(clippy::single_match)] // Clearer in some cases
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Encore API Library
//!
//! HTTP surface for the Encore platform: the Stripe webhook endpoint and the
//! authenticated purchase/payment-method reads.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
