//! API error types and HTTP mappings

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use encore_payments::PaymentsError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Payments not configured")]
    PaymentsUnavailable,

    #[error(transparent)]
    Payments(#[from] PaymentsError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The status code is what the processor's retry loop keys off:
        // 4xx means redelivery cannot succeed, 5xx means try again later.
        let (status, message) = match &self {
            ApiError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
            ApiError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::PaymentsUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "Payments not configured")
            }
            ApiError::Payments(err) => return payments_error_response(err),
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error in request handler");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

fn payments_error_response(err: &PaymentsError) -> Response {
    let status = match err {
        PaymentsError::WebhookSignatureInvalid => StatusCode::BAD_REQUEST,
        PaymentsError::NotAuthorized => StatusCode::FORBIDDEN,
        PaymentsError::NotFound(_) => StatusCode::NOT_FOUND,
        // Fatal input: redelivering the same event cannot succeed, so answer
        // with a 4xx to stop the processor's blind retry loop.
        PaymentsError::UnsupportedEvent(_)
        | PaymentsError::MissingMetadata(_)
        | PaymentsError::InvalidInput(_)
        | PaymentsError::ProductNotFound(_)
        | PaymentsError::MissingFileReference(_)
        | PaymentsError::CustomerNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
        // Consistency faults are already logged loudly at the source; a 500
        // keeps the delivery visible in the processor's dashboard.
        PaymentsError::ConsistencyFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        // Transient: let the processor retry.
        PaymentsError::DuplicateEvent(_)
        | PaymentsError::Database(_)
        | PaymentsError::StripeApi(_)
        | PaymentsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "Payments error in request handler");
    } else {
        tracing::warn!(error = %err, "Payments request rejected");
    }

    let body = Json(json!({
        "error": err.to_string(),
        "code": status.as_u16()
    }));

    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use uuid::Uuid;

    #[test]
    fn fatal_input_maps_to_unprocessable() {
        let resp = ApiError::Payments(PaymentsError::MissingFileReference(Uuid::new_v4()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn transient_maps_to_server_error() {
        let resp =
            ApiError::Payments(PaymentsError::Database("timeout".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn signature_failure_maps_to_bad_request() {
        let resp = ApiError::Payments(PaymentsError::WebhookSignatureInvalid).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
