//! Refresh and logout.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;

use super::state::AuthState;
use super::storage::{clear_refresh_token, load_refresh_slot};
use super::types::{AccessTokenResponse, LogoutRequest, RefreshRequest};

/// Mint a new access token from a valid refresh token.
///
/// The presented token must match the stored slot exactly; a superseded or
/// logged-out token fails even when its signature is still valid.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Invalid, expired, or revoked refresh token", body = String)
    ),
    tag = "auth"
)]
pub async fn refresh(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let claims = auth_state
        .keys()
        .verify_refresh_token(&request.refresh_token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

    let slot = load_refresh_slot(&pool, claims.sub).await?;
    let Some((stored, role)) = slot else {
        return Err(ApiError::Unauthorized("Invalid refresh token".to_string()));
    };

    // Exact-match against the single slot is what makes logout and login
    // effective revocation.
    if stored.as_deref() != Some(request.refresh_token.as_str()) {
        return Err(ApiError::Unauthorized("Invalid refresh token".to_string()));
    }

    let access_token = auth_state.keys().sign_access_token(claims.sub, role)?;

    Ok(Json(AccessTokenResponse { access_token }))
}

/// Invalidate a refresh token by clearing the slot that holds it.
/// Idempotent: unknown tokens still return 204.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 400, description = "Missing payload", body = String)
    ),
    tag = "auth"
)]
pub async fn logout(
    pool: Extension<PgPool>,
    payload: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    clear_refresh_token(&pool, &request.refresh_token).await?;

    info!("logout processed");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::super::{state::AuthConfig, storage::Role, tokens::TokenKeys};
    use super::*;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("https://konto.dev".to_string()),
            TokenKeys::new(
                &SecretString::from("access-secret"),
                &SecretString::from("refresh-secret"),
            ),
            None,
        ))
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap()
    }

    #[tokio::test]
    async fn refresh_missing_payload() {
        let response = refresh(Extension(lazy_pool()), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_rejects_garbage_token() {
        let response = refresh(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(RefreshRequest {
                refresh_token: "garbage".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let state = auth_state();
        let access = state
            .keys()
            .sign_access_token(Uuid::new_v4(), Role::User)
            .unwrap();
        let response = refresh(
            Extension(lazy_pool()),
            Extension(state),
            Some(Json(RefreshRequest {
                refresh_token: access,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_missing_payload() {
        let response = logout(Extension(lazy_pool()), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
