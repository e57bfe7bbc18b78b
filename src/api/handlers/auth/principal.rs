//! Bearer-token auth gate for protected endpoints.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use uuid::Uuid;

use crate::api::error::ApiError;

use super::state::AuthState;
use super::storage::Role;

/// The authenticated caller, as asserted by a valid access token.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

/// Extract and verify the bearer access token.
///
/// Every failure collapses into the same generic Unauthorized so callers
/// cannot distinguish a missing header from an expired token.
pub(crate) fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Not authorized".to_string()))?;

    let claims = state
        .keys()
        .verify_access_token(token)
        .ok_or_else(|| ApiError::Unauthorized("Not authorized".to_string()))?;

    Ok(Principal {
        user_id: claims.sub,
        role: claims.role,
    })
}

/// Require the admin role on an already-authenticated principal.
pub(crate) fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Admin access required".to_string()))
    }
}
