//! Password login.

use axum::{Json, extract::Extension, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;

use super::password::verify_password;
use super::state::AuthState;
use super::storage::{lookup_login_record, store_refresh_token};
use super::types::{LoginRequest, TokenPairResponse};
use super::utils::normalize_email;

/// Exchange email + password for an access/refresh token pair.
///
/// The refresh token is persisted into the user's single slot, revoking any
/// previously issued refresh token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPairResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Bad credentials or unverified account", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let email = normalize_email(&request.email);

    let record = lookup_login_record(&pool, &email).await?;

    // One generic message for unknown email, OAuth-only accounts, and wrong
    // passwords so responses cannot be used to probe accounts.
    let Some(record) = record else {
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };
    let Some(password_hash) = record.password_hash.as_deref() else {
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };
    if !verify_password(&request.password, password_hash) {
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    if !record.is_verified {
        return Err(ApiError::Unauthorized(
            "Please verify your email to login".to_string(),
        ));
    }

    let access_token = auth_state
        .keys()
        .sign_access_token(record.user_id, record.role)?;
    let refresh_token = auth_state
        .keys()
        .sign_refresh_token(record.user_id, record.role)?;

    store_refresh_token(&pool, record.user_id, &refresh_token).await?;

    info!(user_id = %record.user_id, "login succeeded");

    Ok(Json(TokenPairResponse {
        access_token,
        refresh_token,
    }))
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

    #[tokio::test]
    async fn login_missing_payload() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .unwrap();
        let response = login(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
