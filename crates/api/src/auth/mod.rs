//! Bearer-token authentication
//!
//! Reads are scoped to "the current user"; this module turns an
//! `Authorization: Bearer` header into that user's internal id.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims carried in access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Internal user id
    pub sub: Uuid,
    pub role: String,
    pub exp: i64,
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn issue_token(&self, user_id: Uuid, role: &str) -> Result<String, ApiError> {
        let exp = OffsetDateTime::now_utc().unix_timestamp() + self.expiry_hours * 3600;
        let claims = Claims {
            sub: user_id,
            role: role.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign access token");
            ApiError::Config("token signing failed".to_string())
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::InvalidToken)
    }
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::MissingAuth)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::MissingAuth)?;

        let claims = state.jwt_manager.verify_token(token)?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}
