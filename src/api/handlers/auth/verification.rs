//! Email verification endpoints.

use axum::{Json, extract::Extension, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;

use super::state::AuthState;
use super::storage::{ResendOutcome, consume_verification_token, refresh_verification_token};
use super::types::{MessageResponse, ResendVerificationRequest, VerifyEmailRequest};
use super::utils::{normalize_email, valid_email};

/// Verify the email link by consuming the hashed token and activating the user.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("Invalid or expired token".to_string()));
    }

    // Wrong, expired, and already-consumed tokens are indistinguishable.
    if consume_verification_token(&pool, token).await? {
        info!("email verified");
        Ok(Json(MessageResponse::new("Email verified")))
    } else {
        Err(ApiError::BadRequest("Invalid or expired token".to_string()))
    }
}

/// Issue a fresh verification token for an unverified account.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification email queued", body = MessageResponse),
        (status = 400, description = "Account already verified", body = String),
        (status = 404, description = "No account for that email", body = String)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email".to_string()));
    }

    match refresh_verification_token(&pool, &email, auth_state.config()).await? {
        ResendOutcome::Queued => Ok(Json(MessageResponse::new("Verification email sent"))),
        ResendOutcome::AlreadyVerified => {
            Err(ApiError::BadRequest("Account already verified".to_string()))
        }
        ResendOutcome::NotFound => Err(ApiError::NotFound("User not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{state::AuthConfig, tokens::TokenKeys};
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
    async fn verify_email_missing_payload() {
        let response = verify_email(Extension(lazy_pool()), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_email_empty_token() {
        let response = verify_email(
            Extension(lazy_pool()),
            Some(Json(VerifyEmailRequest {
                token: " ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resend_verification_invalid_email() {
        let response = resend_verification(
            Extension(lazy_pool()),
            Extension(auth_state()),
            Some(Json(ResendVerificationRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
