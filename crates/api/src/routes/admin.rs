//! Operator endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use encore_payments::InvariantChecker;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Whether an external event has been applied
pub async fn event_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !auth.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let payments = state.payments()?;
    let processed = payments.webhooks.is_event_processed(&event_id).await?;

    Ok(Json(json!({
        "event_id": event_id,
        "processed": processed,
    })))
}

/// Run the payments consistency checks and report violations
pub async fn run_invariants(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<encore_payments::InvariantCheckSummary>> {
    if !auth.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let checker = InvariantChecker::new(state.pool.clone());
    let summary = checker.run_all_checks().await.map_err(ApiError::Payments)?;

    if !summary.healthy {
        tracing::error!(
            checks_failed = summary.checks_failed,
            "Payments invariant violations found"
        );
    }

    Ok(Json(summary))
}
