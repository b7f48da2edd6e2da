//! Purchase history endpoints

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use encore_payments::Purchase;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// All of the caller's purchases, newest first
pub async fn list_purchases(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Purchase>>> {
    let payments = state.payments()?;
    let purchases = payments.orders.purchases_for_user(auth.user_id).await?;
    Ok(Json(purchases))
}

/// A single order; 403 unless the caller owns it
pub async fn get_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Purchase>> {
    let payments = state.payments()?;
    let purchase = payments
        .orders
        .order_for_user(order_id, auth.user_id)
        .await?;
    Ok(Json(purchase))
}
