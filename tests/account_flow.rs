//! Store-backed account lifecycle tests.
//!
//! These drive the real router against a live Postgres and are gated on
//! `KONTO_TEST_DSN`; when the variable is unset each test returns early so
//! the suite stays runnable without a database:
//!
//! ```sh
//! KONTO_TEST_DSN="postgres://konto@localhost/konto_test" cargo test --test account_flow
//! ```
//!
//! The schema from `db/sql/` is applied on connect (idempotent), and every
//! test registers its own throwaway account, so tests can run concurrently
//! against a shared database.

use anyhow::{Context, Result, ensure};
use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use konto::api;
use konto::api::handlers::auth::{AuthConfig, AuthState, TokenKeys};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::{env, sync::Arc, time::Duration};
use tower::util::ServiceExt;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../db/sql/01_konto.sql");
const PASSWORD: &str = "Str0ng&Secure!pw";

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = env::var("KONTO_TEST_DSN") else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&dsn)
        .await
        .context("Failed to connect to KONTO_TEST_DSN")?;

    // Tests in this binary run concurrently; serialize the idempotent schema
    // apply on one connection so CREATE IF NOT EXISTS never races.
    let mut conn = pool.acquire().await?;
    sqlx::query("SELECT pg_advisory_lock(727001)")
        .execute(&mut *conn)
        .await?;
    let applied = sqlx::raw_sql(SCHEMA).execute(&mut *conn).await;
    sqlx::query("SELECT pg_advisory_unlock(727001)")
        .execute(&mut *conn)
        .await?;
    drop(conn);
    applied.context("Failed to apply schema")?;

    Ok(Some(pool))
}

fn app(pool: PgPool) -> Router {
    let (router, _openapi) = api::router().split_for_parts();
    let auth_state = Arc::new(AuthState::new(
        AuthConfig::new("https://konto.test".to_string()),
        TokenKeys::new(
            &SecretString::from("it-access-secret"),
            &SecretString::from("it-refresh-secret"),
        ),
        None,
    ));

    router
        .layer(Extension(auth_state))
        .layer(Extension(pool))
}

async fn post(app: &Router, path: &str, body: Value) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 64 * 1024).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok((status, value))
}

/// Pull the token out of the most recent mailed link for this address.
/// `link_key` is `verify_url` or `reset_url`, matching the outbox payload.
async fn mailed_token(pool: &PgPool, to_email: &str, link_key: &str) -> Result<String> {
    let row = sqlx::query(
        "SELECT payload_json->>$2 AS url FROM email_outbox \
         WHERE to_email = $1 AND payload_json->>$2 IS NOT NULL \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(to_email)
    .bind(link_key)
    .fetch_one(pool)
    .await
    .context("no mailed link found")?;

    let url: String = row.get("url");
    url.split("token=")
        .nth(1)
        .map(str::to_string)
        .context("mailed link carries no token")
}

/// Register a fresh account and consume its verification token.
async fn register_verified(app: &Router, pool: &PgPool) -> Result<String> {
    let suffix = Uuid::new_v4().simple().to_string();
    let username = format!("it-{}", &suffix[..10]);
    let email = format!("{username}@example.com");

    let (status, _) = post(
        app,
        "/v1/auth/register",
        json!({ "username": username, "email": email, "password": PASSWORD }),
    )
    .await?;
    ensure!(status == StatusCode::CREATED, "register failed: {status}");

    let token = mailed_token(pool, &email, "verify_url").await?;
    let (status, _) = post(app, "/v1/auth/verify-email", json!({ "token": token })).await?;
    ensure!(status == StatusCode::OK, "verify failed: {status}");

    Ok(email)
}

#[tokio::test]
async fn verification_token_gates_login_and_is_single_use() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool.clone());

    let suffix = Uuid::new_v4().simple().to_string();
    let username = format!("it-{}", &suffix[..10]);
    let email = format!("{username}@example.com");

    let (status, _) = post(
        &app,
        "/v1/auth/register",
        json!({ "username": username, "email": email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    // Unverified accounts cannot obtain tokens.
    let (status, body) = post(
        &app,
        "/v1/auth/login",
        json!({ "email": email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Please verify your email to login");

    let token = mailed_token(&pool, &email, "verify_url").await?;

    let (status, _) = post(&app, "/v1/auth/verify-email", json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::OK);

    // The token was cleared on consumption; replaying it fails.
    let (status, body) = post(&app, "/v1/auth/verify-email", json!({ "token": token })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired token");

    let (status, body) = post(
        &app,
        "/v1/auth/login",
        json!({ "email": email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());

    Ok(())
}

#[tokio::test]
async fn refresh_slot_revokes_superseded_and_logged_out_tokens() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool.clone());
    let email = register_verified(&app, &pool).await?;

    let (status, first) = post(
        &app,
        "/v1/auth/login",
        json!({ "email": email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let first_refresh = first["refresh_token"]
        .as_str()
        .context("missing refresh_token")?
        .to_string();

    // The freshly issued token occupies the slot and refreshes.
    let (status, body) = post(
        &app,
        "/v1/auth/refresh",
        json!({ "refresh_token": first_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());

    // iat has second precision; wait so the second login signs a new token.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (status, second) = post(
        &app,
        "/v1/auth/login",
        json!({ "email": email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let second_refresh = second["refresh_token"]
        .as_str()
        .context("missing refresh_token")?
        .to_string();
    assert_ne!(first_refresh, second_refresh);

    // Re-login overwrote the slot: the first token is revoked even though its
    // signature is still valid.
    let (status, _) = post(
        &app,
        "/v1/auth/refresh",
        json!({ "refresh_token": first_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(
        &app,
        "/v1/auth/refresh",
        json!({ "refresh_token": second_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // Logout clears the slot; the surviving token stops refreshing too.
    let (status, _) = post(
        &app,
        "/v1/auth/logout",
        json!({ "refresh_token": second_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = post(
        &app,
        "/v1/auth/refresh",
        json!({ "refresh_token": second_refresh }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn reset_token_is_single_use() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };
    let app = app(pool.clone());
    let email = register_verified(&app, &pool).await?;

    let (status, _) = post(&app, "/v1/auth/forgot-password", json!({ "email": email })).await?;
    assert_eq!(status, StatusCode::OK);

    let token = mailed_token(&pool, &email, "reset_url").await?;

    // Validation does not consume the token.
    let (status, _) = post(
        &app,
        "/v1/auth/validate-reset-token",
        json!({ "token": token }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let new_password = "N3w&Secure!pass";
    let (status, _) = post(
        &app,
        "/v1/auth/reset-password",
        json!({ "token": token, "password": new_password }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // The reset cleared the token; replaying it fails.
    let (status, body) = post(
        &app,
        "/v1/auth/reset-password",
        json!({ "token": token, "password": "An0ther&G00d!pw" }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired token");

    // Old password out, new password in.
    let (status, _) = post(
        &app,
        "/v1/auth/login",
        json!({ "email": email, "password": PASSWORD }),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(
        &app,
        "/v1/auth/login",
        json!({ "email": email, "password": new_password }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}
