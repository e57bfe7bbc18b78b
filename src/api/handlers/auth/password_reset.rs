//! Password reset flow: forgot, validate, reset.

use axum::{Json, extract::Extension, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{find_user_by_reset_token, finish_password_reset, start_password_reset};
use super::types::{
    ForgotPasswordRequest, MessageResponse, ResetPasswordRequest, ValidateResetTokenRequest,
};
use super::utils::{normalize_email, valid_email, validate_password};

/// Start a password reset: store a hashed one-time token and email the link.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email queued", body = MessageResponse),
        (status = 400, description = "Invalid email", body = String),
        (status = 404, description = "No account for that email", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email".to_string()));
    }

    if start_password_reset(&pool, &email, auth_state.config()).await? {
        Ok(Json(MessageResponse::new("Password reset email sent")))
    } else {
        Err(ApiError::NotFound("User not found".to_string()))
    }
}

/// Check a reset token without consuming it (used by the frontend form).
#[utoipa::path(
    post,
    path = "/v1/auth/validate-reset-token",
    request_body = ValidateResetTokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = String)
    ),
    tag = "auth"
)]
pub async fn validate_reset_token(
    pool: Extension<PgPool>,
    payload: Option<Json<ValidateResetTokenRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() || find_user_by_reset_token(&pool, token).await?.is_none() {
        return Err(ApiError::BadRequest("Invalid or expired token".to_string()));
    }

    Ok(Json(MessageResponse::new("Token is valid")))
}

/// Consume a reset token and set the new password. No auto-login.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid token or weak password", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    validate_password(&request.password).map_err(ApiError::BadRequest)?;

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("Invalid or expired token".to_string()));
    }

    let Some(user_id) = find_user_by_reset_token(&pool, token).await? else {
        return Err(ApiError::BadRequest("Invalid or expired token".to_string()));
    };

    let new_hash = hash_password(&request.password)?;

    // The update re-checks the reset state, so a token consumed in between
    // fails here instead of silently double-spending.
    if finish_password_reset(&pool, user_id, &new_hash).await? {
        info!(user_id = %user_id, "password reset completed");
        Ok(Json(MessageResponse::new("Password updated")))
    } else {
        Err(ApiError::BadRequest("Invalid or expired token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{state::AuthConfig, state::AuthState, tokens::TokenKeys};
    use super::*;
    use axum::http::StatusCode;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

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
    async fn forgot_password_invalid_email() {
        let response = forgot_password(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ForgotPasswordRequest {
                email: "nope".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn validate_reset_token_missing_payload() {
        let response = validate_reset_token(Extension(lazy_pool()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_password_rejects_weak_password() {
        let response = reset_password(
            Extension(lazy_pool()),
            Some(Json(ResetPasswordRequest {
                token: "some-token".to_string(),
                password: "weak".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
