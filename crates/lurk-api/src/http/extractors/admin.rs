//! Operator token extractor guarding administrative routes.
//!
//! The token is read from:
//! - `Authorization: Bearer <token>` header
//! - `X-Admin-Token: <token>` header
//!
//! Tokens are SHA-256 hashed and compared against the digest of the
//! configured `admin_token`. Without a configured token the guard admits
//! every request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::http::error::AppError;
use crate::state::AppState;

/// Marker proving the request carried the operator token.
pub struct Operator;

impl FromRequestParts<AppState> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_digest.as_deref() else {
            return Ok(Operator);
        };

        let token = extract_admin_token(parts)?;
        if hash_admin_token(&token) == expected {
            Ok(Operator)
        } else {
            tracing::warn!("rejected administrative request: wrong operator token");
            Err(AppError::Unauthorized("Invalid operator token".to_string()))
        }
    }
}

fn extract_admin_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    if let Some(token) = parts.headers.get("x-admin-token") {
        let token_str = token.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid X-Admin-Token header encoding".to_string())
        })?;
        return Ok(token_str.trim().to_string());
    }

    Err(AppError::Unauthorized(
        concat!(
            "Missing operator token. Provide it via 'Authorization: Bearer <token>' ",
            "or 'X-Admin-Token: <token>' header."
        )
        .to_string(),
    ))
}

/// SHA-256 of an operator token (lowercase hex).
pub fn hash_admin_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}
