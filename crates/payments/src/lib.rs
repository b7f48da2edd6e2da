// Payments crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::too_many_arguments)] // Upsert signatures mirror the table columns
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Encore Payments Module
//!
//! Handles Stripe webhook ingestion and the order/entitlement pipeline.
//!
//! ## Features
//!
//! - **Webhook Dispatch**: Verify deliveries, validate payloads once at the
//!   boundary, route each event to exactly one handler
//! - **Idempotency Ledger**: Append-only record of applied event ids; makes
//!   replay and redelivery safe
//! - **Orders & Entitlements**: At-most-once order creation per checkout
//!   session, with the deliverable reference snapshotted at purchase time
//! - **Payment-Method Read Model**: Local mirror of saved cards, synced only
//!   by the webhook stream
//! - **Invariants**: Runnable consistency checks over the pipeline's state

pub mod client;
pub mod error;
pub mod events;
pub mod invariants;
pub mod ledger;
pub mod orders;
pub mod payment_methods;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Client
pub use client::{PaymentProvider, StripeClient, StripeConfig};

// Error
pub use error::{PaymentsError, PaymentsResult};

// Events
pub use events::{
    CardSummary, CheckoutCompleted, CustomerUpdate, EventPayload, PaymentMethodAttach,
    SetupSucceeded, WebhookEvent,
};

// Ledger
pub use ledger::{EventLedger, ProcessedEvent, PROVIDER};

// Orders
pub use orders::{Order, OrderItem, OrderService, ProductSnapshot, Purchase};

// Payment methods
pub use payment_methods::{PaymentMethod, PaymentMethodProjector};

// Webhooks
pub use webhooks::{DispatchOutcome, WebhookDispatcher};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

use sqlx::PgPool;
use std::sync::Arc;

/// Main payments service that combines the pipeline's components
pub struct PaymentsService {
    pub orders: OrderService,
    pub payment_methods: PaymentMethodProjector,
    pub ledger: EventLedger,
    pub webhooks: WebhookDispatcher,
}

impl PaymentsService {
    /// Create a payments service from environment variables
    pub fn from_env(pool: PgPool) -> PaymentsResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::new(stripe, pool))
    }

    /// Create a payments service with an explicit client
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let webhook_secret = stripe.config().webhook_secret.clone();
        let provider: Arc<dyn PaymentProvider> = Arc::new(stripe);

        Self {
            orders: OrderService::new(pool.clone()),
            payment_methods: PaymentMethodProjector::new(pool.clone()),
            ledger: EventLedger::new(pool.clone()),
            webhooks: WebhookDispatcher::new(provider, webhook_secret, pool),
        }
    }
}
