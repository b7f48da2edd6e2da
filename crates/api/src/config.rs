//! Server configuration

use crate::error::{ApiError, ApiResult};

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
}

impl Config {
    pub fn from_env() -> ApiResult<Self> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let jwt_expiry_hours = std::env::var("JWT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        Ok(Self {
            database_url,
            bind_address,
            jwt_secret,
            jwt_expiry_hours,
        })
    }
}

fn required(name: &str) -> ApiResult<String> {
    std::env::var(name).map_err(|_| ApiError::Config(format!("{} not set", name)))
}
