//! Route registration

pub mod admin;
pub mod orders;
pub mod payment_methods;
pub mod webhooks;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route(
            "/me/payment-methods",
            get(payment_methods::list_payment_methods),
        )
        .route("/me/purchases", get(orders::list_purchases))
        .route("/orders/{order_id}", get(orders::get_order))
        .route("/admin/events/{event_id}", get(admin::event_status))
        .route("/admin/invariants", get(admin::run_invariants))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
