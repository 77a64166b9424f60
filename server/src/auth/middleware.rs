//! Authentication middleware.
//!
//! Every table route requires a Bearer token. When `AUTH_SECRET` is
//! configured the token must equal it; otherwise any non-empty token passes.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The bearer token
    #[allow(dead_code)]
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let header = auth_header.ok_or(AppError::Unauthorized("Missing authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized("Invalid authorization header format"))?
            .trim();

        if token.is_empty() {
            return Err(AppError::Unauthorized("Empty bearer token"));
        }

        if let Some(secret) = state.config.auth_secret.as_deref() {
            if token != secret {
                tracing::debug!("rejected bearer token");
                return Err(AppError::Unauthorized("Invalid token"));
            }
        }

        Ok(AuthUser {
            token: token.to_string(),
        })
    }
}
