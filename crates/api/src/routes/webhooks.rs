//! Stripe webhook endpoint

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use encore_payments::{DispatchOutcome, PaymentsError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Receive a webhook delivery from Stripe.
///
/// The body must stay raw for signature verification, so this handler takes
/// the unparsed string and hands it to the dispatcher whole. The response
/// status is the retry contract: 2xx acknowledges (including idempotent
/// no-ops), 4xx tells Stripe redelivery cannot succeed, 5xx asks for a retry.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<DispatchOutcome>> {
    let payments = state.payments()?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Payments(PaymentsError::WebhookSignatureInvalid))?;

    let outcome = payments.webhooks.ingest(&body, signature).await?;

    if outcome.already_processed() {
        tracing::info!("Webhook delivery acknowledged as already processed");
    }

    Ok(Json(outcome))
}
