//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use encore_payments::PaymentsService;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::error::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    /// Payments service; `None` when Stripe env vars are absent so the rest
    /// of the API still serves local reads
    pub payments: Option<Arc<PaymentsService>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let payments = match PaymentsService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe payments service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe payments not configured: {}", e);
                None
            }
        };

        Self {
            pool,
            config,
            jwt_manager,
            payments,
        }
    }

    /// Payments service, or a 503 for routes that need it
    pub fn payments(&self) -> Result<&Arc<PaymentsService>, ApiError> {
        self.payments.as_ref().ok_or(ApiError::PaymentsUnavailable)
    }
}
