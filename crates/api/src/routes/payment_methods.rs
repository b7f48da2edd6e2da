//! Saved payment-method reads
//!
//! Serves the local read model only. These handlers never call Stripe; the
//! webhook stream is the sole writer of the table they read.

use axum::extract::State;
use axum::Json;

use encore_payments::PaymentMethod;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// The caller's saved payment methods: default first, then newest first
pub async fn list_payment_methods(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<PaymentMethod>>> {
    let payments = state.payments()?;
    let methods = payments
        .payment_methods
        .list_for_user(auth.user_id)
        .await?;
    Ok(Json(methods))
}
