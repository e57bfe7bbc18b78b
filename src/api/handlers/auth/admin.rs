//! Admin-only account management.

use axum::{
    Json,
    extract::{Extension, Path},
    http::HeaderMap,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::error::ApiError;

use super::principal::{require_admin, require_auth};
use super::state::AuthState;
use super::storage::{
    Role, UserRecord, delete_non_admin_users, delete_unverified_users, delete_user_with_profile,
    fetch_user, list_unverified_users, list_users, update_role,
};
use super::types::{DeletedCountResponse, UpdateRoleRequest, UserResponse};

fn admin_gate(headers: &HeaderMap, state: &AuthState) -> Result<(), ApiError> {
    let principal = require_auth(headers, state)?;
    require_admin(&principal)
}

fn to_response(record: UserRecord) -> UserResponse {
    UserResponse {
        id: record.id,
        username: record.username,
        email: record.email,
        role: record.role.as_str().to_string(),
        is_verified: record.is_verified,
        avatar_url: record.avatar_url,
        created_at: record.created_at,
    }
}

/// List every account.
#[utoipa::path(
    get,
    path = "/v1/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [UserResponse]),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    let users = list_users(&pool).await?;
    Ok(Json(
        users.into_iter().map(to_response).collect::<Vec<_>>(),
    ))
}

/// Fetch one account by id.
#[utoipa::path(
    get,
    path = "/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String),
        (status = 404, description = "User not found", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_get_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    match fetch_user(&pool, id).await? {
        Some(record) => Ok(Json(to_response(record))),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

/// Change an account's role.
#[utoipa::path(
    put,
    path = "/v1/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 400, description = "Unknown role", body = String),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String),
        (status = 404, description = "User not found", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_update_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<UpdateRoleRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload".to_string()));
    };

    let Some(role) = Role::parse(request.role.trim()) else {
        return Err(ApiError::BadRequest(
            "Role must be 'user' or 'admin'".to_string(),
        ));
    };

    if !update_role(&pool, id, role).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!(user_id = %id, role = role.as_str(), "role updated");

    // Role changes take effect on the next token issuance; outstanding access
    // tokens keep their embedded role until they expire.
    match fetch_user(&pool, id).await? {
        Some(record) => Ok(Json(to_response(record))),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

/// Delete one account (profile first, then the user).
#[utoipa::path(
    delete,
    path = "/v1/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String),
        (status = 404, description = "User not found", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_delete_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    if delete_user_with_profile(&pool, id).await? {
        info!(user_id = %id, "account deleted");
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("User not found".to_string()))
    }
}

/// List unverified accounts.
#[utoipa::path(
    get,
    path = "/v1/admin/users/unverified",
    responses(
        (status = 200, description = "Unverified accounts", body = [UserResponse]),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_list_unverified(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    let users = list_unverified_users(&pool).await?;
    Ok(Json(
        users.into_iter().map(to_response).collect::<Vec<_>>(),
    ))
}

/// Delete every unverified account.
#[utoipa::path(
    delete,
    path = "/v1/admin/users/unverified",
    responses(
        (status = 200, description = "Unverified accounts deleted", body = DeletedCountResponse),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String),
        (status = 404, description = "No unverified accounts", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_delete_unverified(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    let deleted = delete_unverified_users(&pool).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("No unverified accounts".to_string()));
    }

    info!(deleted, "unverified accounts deleted");

    Ok(Json(DeletedCountResponse { deleted }))
}

/// Delete every non-admin account, returning the count.
#[utoipa::path(
    delete,
    path = "/v1/admin/users",
    responses(
        (status = 200, description = "Non-admin accounts deleted", body = DeletedCountResponse),
        (status = 401, description = "Not authorized", body = String),
        (status = 403, description = "Admin access required", body = String)
    ),
    tag = "admin"
)]
pub async fn admin_delete_all(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    admin_gate(&headers, &auth_state)?;

    let deleted = delete_non_admin_users(&pool).await?;

    info!(deleted, "non-admin accounts deleted");

    Ok(Json(DeletedCountResponse { deleted }))
}
