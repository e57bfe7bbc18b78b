//! Google OAuth login endpoints.

use axum::{
    Json,
    extract::{Extension, Query},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::api::error::ApiError;

use super::state::AuthState;
use super::storage::{find_or_create_oauth_user, store_refresh_token};
use super::types::TokenPairResponse;

#[derive(Deserialize, IntoParams, Debug)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Redirect the browser to Google's consent screen.
///
/// The `state` parameter is a short-lived signed value; the callback rejects
/// anything it did not mint, so the service stays stateless across the
/// redirect.
#[utoipa::path(
    get,
    path = "/v1/auth/google",
    responses(
        (status = 307, description = "Redirect to the Google consent screen"),
        (status = 404, description = "Google login is not configured", body = String)
    ),
    tag = "auth"
)]
pub async fn google_authorize(
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(provider) = auth_state.google() else {
        return Err(ApiError::NotFound(
            "Google login is not configured".to_string(),
        ));
    };

    let state = auth_state.keys().sign_oauth_state()?;
    let url = provider.authorize_url(&state)?;

    Ok(Redirect::temporary(&url))
}

/// Handle the provider redirect: exchange the code, find or create the
/// account, and issue the same token pair as password login.
#[utoipa::path(
    get,
    path = "/v1/auth/google/callback",
    params(CallbackQuery),
    responses(
        (status = 200, description = "Token pair issued", body = TokenPairResponse),
        (status = 401, description = "Consent denied, bad state, or code exchange failed", body = String),
        (status = 404, description = "Google login is not configured", body = String),
        (status = 409, description = "Email already registered with a password", body = String)
    ),
    tag = "auth"
)]
pub async fn google_callback(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(provider) = auth_state.google() else {
        return Err(ApiError::NotFound(
            "Google login is not configured".to_string(),
        ));
    };

    if query.error.is_some() {
        return Err(ApiError::Unauthorized("Google login failed".to_string()));
    }

    // The state must be one this service signed; a missing or forged value
    // means the callback did not originate from our own redirect.
    let state_ok = query
        .state
        .as_deref()
        .is_some_and(|state| auth_state.keys().verify_oauth_state(state));
    if !state_ok {
        return Err(ApiError::Unauthorized("Google login failed".to_string()));
    }

    let Some(code) = query.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
        return Err(ApiError::Unauthorized("Google login failed".to_string()));
    };

    // Upstream denial never creates an account.
    let identity = match provider.exchange_code(code).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("google code exchange failed: {err:#}");
            return Err(ApiError::Unauthorized("Google login failed".to_string()));
        }
    };

    let username = derive_username(identity.name.as_deref(), &identity.email);

    let created = find_or_create_oauth_user(
        &pool,
        &identity.provider_id,
        &identity.email,
        &username,
        identity.avatar_url.as_deref(),
    )
    .await?;

    let Some((user_id, role)) = created else {
        return Err(ApiError::Conflict(
            "Email already registered with a password".to_string(),
        ));
    };

    let access_token = auth_state.keys().sign_access_token(user_id, role)?;
    let refresh_token = auth_state.keys().sign_refresh_token(user_id, role)?;

    store_refresh_token(&pool, user_id, &refresh_token).await?;

    info!(user_id = %user_id, "google login succeeded");

    Ok(Json(TokenPairResponse {
        access_token,
        refresh_token,
    }))
}

/// Derive a username from the provider profile, constrained to the same
/// charset and length as registration. Uniqueness is left to the insert.
fn derive_username(name: Option<&str>, email: &str) -> String {
    let source = name
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let mut username: String = source
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                Some(c)
            } else if c.is_whitespace() {
                Some('.')
            } else {
                None
            }
        })
        .take(20)
        .collect();

    if username.chars().count() < 4 {
        let suffix = Uuid::new_v4().simple().to_string();
        username.push('-');
        username.push_str(&suffix[..7]);
    }

    username
}
