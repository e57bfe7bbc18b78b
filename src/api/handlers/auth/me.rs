//! Endpoints for the authenticated account itself.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;

use super::password::{hash_password, verify_password};
use super::principal::require_auth;
use super::state::AuthState;
use super::storage::{
    delete_user_with_profile, fetch_user, load_password_hash, update_password,
};
use super::types::{ChangePasswordRequest, MessageResponse, UserResponse};
use super::utils::validate_password;

/// Account info for the authenticated user.
#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 401, description = "Not authorized", body = String),
        (status = 404, description = "Account no longer exists", body = String)
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    let Some(record) = fetch_user(&pool, principal.user_id).await? else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };

    Ok(Json(UserResponse {
        id: record.id,
        username: record.username,
        email: record.email,
        role: record.role.as_str().to_string(),
        is_verified: record.is_verified,
        avatar_url: record.avatar_url,
        created_at: record.created_at,
    }))
}

/// Change the password for the authenticated user.
#[utoipa::path(
    post,
    path = "/v1/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Weak password or passwordless account", body = String),
        (status = 401, description = "Not authorized or wrong current password", body = String)
    ),
    tag = "me"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    validate_password(&request.new_password).map_err(ApiError::BadRequest)?;

    let Some(stored) = load_password_hash(&pool, principal.user_id).await? else {
        return Err(ApiError::Unauthorized("Not authorized".to_string()));
    };
    // OAuth-only accounts have no password to change.
    let Some(stored) = stored else {
        return Err(ApiError::BadRequest(
            "Account has no password set".to_string(),
        ));
    };

    if !verify_password(&request.current_password, &stored) {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password(&request.new_password)?;
    update_password(&pool, principal.user_id, &new_hash).await?;

    info!(user_id = %principal.user_id, "password changed");

    Ok(Json(MessageResponse::new("Password changed")))
}

/// Delete the authenticated account (profile first, then the user).
#[utoipa::path(
    delete,
    path = "/v1/me",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Not authorized", body = String),
        (status = 404, description = "Account no longer exists", body = String)
    ),
    tag = "me"
)]
pub async fn delete_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = require_auth(&headers, &auth_state)?;

    if delete_user_with_profile(&pool, principal.user_id).await? {
        info!(user_id = %principal.user_id, "account self-deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("User not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{state::AuthConfig, storage::Role, tokens::TokenKeys};
    use super::*;
    use axum::http::{HeaderValue, header::AUTHORIZATION};
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
    async fn me_without_token_is_unauthorized() {
        let response = me(HeaderMap::new(), Extension(lazy_pool()), Extension(auth_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_password_rejects_weak_new_password() {
        let state = auth_state();
        let token = state
            .keys()
            .sign_access_token(Uuid::new_v4(), Role::User)
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let response = change_password(
            headers,
            Extension(lazy_pool()),
            Extension(state),
            Some(Json(ChangePasswordRequest {
                current_password: "Str0ng&Secure!pw".to_string(),
                new_password: "weak".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_me_without_token_is_unauthorized() {
        let response = delete_me(HeaderMap::new(), Extension(lazy_pool()), Extension(auth_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
