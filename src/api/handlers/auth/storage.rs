//! Database helpers for accounts, verification, reset, and refresh state.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::password::{hash_password, verify_password};
use super::state::AuthConfig;
use super::utils::{
    build_reset_url, build_verify_url, generate_one_time_token, hash_verification_token,
    is_unique_violation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

fn role_from_column(value: &str) -> Result<Role> {
    Role::parse(value).ok_or_else(|| anyhow!("unexpected role in database: {value}"))
}

/// Outcome when attempting to create a new user + profile + verification record.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created,
    Conflict,
}

/// Outcome for a resend-verification request.
#[derive(Debug)]
pub(super) enum ResendOutcome {
    Queued,
    AlreadyVerified,
    NotFound,
}

/// Minimal fields needed for password login.
pub(super) struct LoginRecord {
    pub(super) user_id: Uuid,
    pub(super) password_hash: Option<String>,
    pub(super) role: Role,
    pub(super) is_verified: bool,
}

/// Account fields returned to clients and admins.
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) username: String,
    pub(super) email: String,
    pub(super) role: Role,
    pub(super) is_verified: bool,
    pub(super) avatar_url: Option<String>,
    pub(super) created_at: DateTime<Utc>,
}

fn user_record_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role: role_from_column(row.get::<&str, _>("role"))?,
        is_verified: row.get("is_verified"),
        avatar_url: row.get("avatar_url"),
        created_at: row.get("created_at"),
    })
}

/// Create the user, its profile, the verification token, and the outbound
/// email in a single transaction.
pub(super) async fn create_user_with_profile(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
    config: &AuthConfig,
) -> Result<RegisterOutcome> {
    let mut tx = pool.begin().await.context("begin register transaction")?;

    // Raw token goes into the email only; the row stores its hash.
    let token = generate_one_time_token()?;
    let token_hash = hash_verification_token(&token);

    let query = r"
        INSERT INTO users
            (username, email, password_hash, verification_token_hash, verification_token_expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(&token_hash)
        .bind(config.verify_token_ttl_seconds())
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(RegisterOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    insert_profile(&mut tx, user_id, username).await?;
    enqueue_verification_email(&mut tx, username, email, &token, config).await?;

    tx.commit().await.context("commit register transaction")?;

    Ok(RegisterOutcome::Created)
}

async fn insert_profile(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    display_name: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO profiles (user_id, display_name)
        VALUES ($1, $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(display_name)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert profile")?;

    Ok(())
}

async fn enqueue_verification_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    username: &str,
    email: &str,
    token: &str,
    config: &AuthConfig,
) -> Result<()> {
    let verify_url = build_verify_url(config.frontend_base_url(), token);
    enqueue_email(
        tx,
        email,
        "verify_email",
        &json!({
            "email": email,
            "username": username,
            "verify_url": verify_url,
        }),
    )
    .await
}

async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(())
}

/// Consume a verification token: mark the account verified and clear the
/// token in one statement so the token is single-use.
pub(super) async fn consume_verification_token(pool: &PgPool, token: &str) -> Result<bool> {
    let token_hash = hash_verification_token(token);

    let query = r"
        UPDATE users
        SET is_verified = TRUE,
            verification_token_hash = NULL,
            verification_token_expires_at = NULL,
            updated_at = NOW()
        WHERE verification_token_hash = $1
          AND verification_token_expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(&token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to consume verification token")?;

    Ok(result.rows_affected() > 0)
}

pub(super) async fn refresh_verification_token(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ResendOutcome> {
    let query = "SELECT id, username, is_verified FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user for resend")?;

    let Some(row) = row else {
        return Ok(ResendOutcome::NotFound);
    };
    if row.get::<bool, _>("is_verified") {
        return Ok(ResendOutcome::AlreadyVerified);
    }
    let user_id: Uuid = row.get("id");
    let username: String = row.get("username");

    let mut tx = pool.begin().await.context("begin resend transaction")?;

    let token = generate_one_time_token()?;
    let token_hash = hash_verification_token(&token);

    let query = r"
        UPDATE users
        SET verification_token_hash = $2,
            verification_token_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(&token_hash)
        .bind(config.resend_verify_token_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to refresh verification token")?;

    enqueue_verification_email(&mut tx, &username, email, &token, config).await?;

    tx.commit().await.context("commit resend transaction")?;

    Ok(ResendOutcome::Queued)
}

/// Look up credential data by email (used by password login).
pub(super) async fn lookup_login_record(pool: &PgPool, email: &str) -> Result<Option<LoginRecord>> {
    let query = "SELECT id, password_hash, role, is_verified FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login record")?;

    row.map(|row| {
        Ok(LoginRecord {
            user_id: row.get("id"),
            password_hash: row.get("password_hash"),
            role: role_from_column(row.get::<&str, _>("role"))?,
            is_verified: row.get("is_verified"),
        })
    })
    .transpose()
}

/// Persist a freshly minted refresh token, overwriting the previous slot.
pub(super) async fn store_refresh_token(pool: &PgPool, user_id: Uuid, token: &str) -> Result<()> {
    let query = "UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store refresh token")?;

    Ok(())
}

/// Read the stored refresh token and role for a user.
pub(super) async fn load_refresh_slot(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<(Option<String>, Role)>> {
    let query = "SELECT refresh_token, role FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load refresh token slot")?;

    row.map(|row| {
        Ok((
            row.get::<Option<String>, _>("refresh_token"),
            role_from_column(row.get::<&str, _>("role"))?,
        ))
    })
    .transpose()
}

/// Clear the refresh slot of whichever user holds this token. Idempotent.
pub(super) async fn clear_refresh_token(pool: &PgPool, token: &str) -> Result<()> {
    let query = "UPDATE users SET refresh_token = NULL, updated_at = NOW() WHERE refresh_token = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear refresh token")?;

    Ok(())
}

/// Store an argon2-hashed reset token and enqueue the reset email.
/// Returns false when no account matches the email.
pub(super) async fn start_password_reset(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<bool> {
    let query = "SELECT id, username FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user for password reset")?;

    let Some(row) = row else {
        return Ok(false);
    };
    let user_id: Uuid = row.get("id");
    let username: String = row.get("username");

    let token = generate_one_time_token()?;
    let token_hash = hash_password(&token)?;

    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        UPDATE users
        SET reset_token_hash = $2,
            reset_token_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(&token_hash)
        .bind(config.reset_token_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store reset token")?;

    let reset_url = build_reset_url(config.frontend_base_url(), &token);
    enqueue_email(
        &mut tx,
        email,
        "password_reset",
        &json!({
            "email": email,
            "username": username,
            "reset_url": reset_url,
        }),
    )
    .await?;

    tx.commit().await.context("commit reset transaction")?;

    Ok(true)
}

/// Find the user whose unexpired reset-token hash matches the candidate.
///
/// Tokens are stored as argon2 hashes, so there is no direct lookup; each
/// candidate row is verified individually (constant-time per row).
pub(super) async fn find_user_by_reset_token(pool: &PgPool, token: &str) -> Result<Option<Uuid>> {
    let query = r"
        SELECT id, reset_token_hash
        FROM users
        WHERE reset_token_hash IS NOT NULL
          AND reset_token_expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load reset candidates")?;

    for row in rows {
        let stored: String = row.get("reset_token_hash");
        if verify_password(token, &stored) {
            return Ok(Some(row.get("id")));
        }
    }

    Ok(None)
}

/// Replace the password and clear reset state. The WHERE clause re-checks the
/// reset state so a concurrently consumed token cannot be reused.
pub(super) async fn finish_password_reset(
    pool: &PgPool,
    user_id: Uuid,
    new_password_hash: &str,
) -> Result<bool> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            reset_token_hash = NULL,
            reset_token_expires_at = NULL,
            updated_at = NOW()
        WHERE id = $1
          AND reset_token_hash IS NOT NULL
          AND reset_token_expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to finish password reset")?;

    Ok(result.rows_affected() > 0)
}

/// Read the stored password hash for an authenticated password change.
pub(super) async fn load_password_hash(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<Option<String>>> {
    let query = "SELECT password_hash FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to load password hash")?;

    Ok(row.map(|row| row.get("password_hash")))
}

pub(super) async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    new_password_hash: &str,
) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;

    Ok(())
}

pub(super) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, username, email, role, is_verified, avatar_url, created_at \
                 FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    row.as_ref().map(user_record_from_row).transpose()
}

pub(super) async fn list_users(pool: &PgPool) -> Result<Vec<UserRecord>> {
    let query = "SELECT id, username, email, role, is_verified, avatar_url, created_at \
                 FROM users ORDER BY created_at";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;

    rows.iter().map(user_record_from_row).collect()
}

pub(super) async fn list_unverified_users(pool: &PgPool) -> Result<Vec<UserRecord>> {
    let query = "SELECT id, username, email, role, is_verified, avatar_url, created_at \
                 FROM users WHERE is_verified = FALSE ORDER BY created_at";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list unverified users")?;

    rows.iter().map(user_record_from_row).collect()
}

/// Update a user's role. Returns false when no row matched.
pub(super) async fn update_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<bool> {
    let query = "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update role")?;

    Ok(result.rows_affected() > 0)
}

/// Delete the profile then the user, in one transaction.
pub(super) async fn delete_user_with_profile(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin delete transaction")?;

    let query = "DELETE FROM profiles WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete profile")?;

    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete user")?;

    tx.commit().await.context("commit delete transaction")?;

    Ok(result.rows_affected() > 0)
}

/// Delete every unverified account (profiles first). Returns the count.
pub(super) async fn delete_unverified_users(pool: &PgPool) -> Result<u64> {
    let mut tx = pool.begin().await.context("begin delete transaction")?;

    let query = r"
        DELETE FROM profiles
        WHERE user_id IN (SELECT id FROM users WHERE is_verified = FALSE)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete unverified profiles")?;

    let query = "DELETE FROM users WHERE is_verified = FALSE";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete unverified users")?;

    tx.commit().await.context("commit delete transaction")?;

    Ok(result.rows_affected())
}

/// Delete every non-admin account (profiles first). Returns the count.
pub(super) async fn delete_non_admin_users(pool: &PgPool) -> Result<u64> {
    let mut tx = pool.begin().await.context("begin delete transaction")?;

    let query = r"
        DELETE FROM profiles
        WHERE user_id IN (SELECT id FROM users WHERE role <> 'admin')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete non-admin profiles")?;

    let query = "DELETE FROM users WHERE role <> 'admin'";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete non-admin users")?;

    tx.commit().await.context("commit delete transaction")?;

    Ok(result.rows_affected())
}

/// Find an account by OAuth provider id, creating it (verified, passwordless,
/// with its profile) when missing.
pub(super) async fn find_or_create_oauth_user(
    pool: &PgPool,
    provider_id: &str,
    email: &str,
    username: &str,
    avatar_url: Option<&str>,
) -> Result<Option<(Uuid, Role)>> {
    let query = "SELECT id, role FROM users WHERE provider_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(provider_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by provider id")?;

    if let Some(row) = row {
        let role = role_from_column(row.get::<&str, _>("role"))?;
        return Ok(Some((row.get("id"), role)));
    }

    let mut tx = pool.begin().await.context("begin oauth transaction")?;

    let query = r"
        INSERT INTO users (username, email, is_verified, provider_id, avatar_url)
        VALUES ($1, $2, TRUE, $3, $4)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(provider_id)
        .bind(avatar_url)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            // Email or username already claimed by a password account.
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(None);
            }
            return Err(err).context("failed to insert oauth user");
        }
    };

    insert_profile(&mut tx, user_id, username).await?;

    tx.commit().await.context("commit oauth transaction")?;

    Ok(Some((user_id, Role::User)))
}
