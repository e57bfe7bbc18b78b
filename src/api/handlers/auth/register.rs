//! Account registration.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;

use super::password::hash_password;
use super::state::AuthState;
use super::storage::{RegisterOutcome, create_user_with_profile};
use super::types::{MessageResponse, RegisterRequest};
use super::utils::{normalize_email, valid_email, validate_password, validate_username};

/// Register a new account. The user starts unverified; a verification link is
/// emailed and the companion profile is created in the same transaction.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email queued", body = MessageResponse),
        (status = 400, description = "Invalid username, email, or password", body = String),
        (status = 409, description = "Username or email already registered", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let username = request.username.trim();
    validate_username(username).map_err(ApiError::BadRequest)?;

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email".to_string()));
    }

    validate_password(&request.password).map_err(ApiError::BadRequest)?;

    let password_hash = hash_password(&request.password)?;

    match create_user_with_profile(&pool, username, &email, &password_hash, auth_state.config())
        .await?
    {
        RegisterOutcome::Created => {
            info!(username, "account registered");
            Ok((
                StatusCode::CREATED,
                Json(MessageResponse::new(
                    "Account created. Please verify your email.",
                )),
            ))
        }
        RegisterOutcome::Conflict => Err(ApiError::Conflict(
            "Username or email already registered".to_string(),
        )),
    }
}
