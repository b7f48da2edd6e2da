//! Payments error types

use thiserror::Error;

pub type PaymentsResult<T> = Result<T, PaymentsError>;

/// Errors produced by the payments core.
///
/// The webhook caller cares about one distinction: can re-delivering the same
/// event ever succeed? `retryable()` encodes that. Fatal input errors signal a
/// data problem upstream (bad metadata, missing product file) and re-delivery
/// won't fix them; consistency faults signal a bug in our own atomic-write
/// guarantee and need an operator, not a retry loop.
#[derive(Debug, Error)]
pub enum PaymentsError {
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Unsupported webhook event type: {0}")]
    UnsupportedEvent(String),

    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Product not found: {0}")]
    ProductNotFound(uuid::Uuid),

    #[error("Product {0} has no deliverable file reference")]
    MissingFileReference(uuid::Uuid),

    #[error("No user found for Stripe customer: {0}")]
    CustomerNotFound(String),

    #[error("Event {0} was delivered concurrently; the other delivery won")]
    DuplicateEvent(String),

    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentsError {
    /// Whether re-delivering the event that produced this error can succeed.
    ///
    /// `DuplicateEvent` is retryable on purpose: the retry re-checks the
    /// ledger, finds the winning delivery's result, and converges.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            PaymentsError::Database(_)
                | PaymentsError::StripeApi(_)
                | PaymentsError::DuplicateEvent(_)
        )
    }
}

impl From<sqlx::Error> for PaymentsError {
    fn from(err: sqlx::Error) -> Self {
        PaymentsError::Database(err.to_string())
    }
}

impl From<stripe::StripeError> for PaymentsError {
    fn from(err: stripe::StripeError) -> Self {
        PaymentsError::StripeApi(err.to_string())
    }
}
