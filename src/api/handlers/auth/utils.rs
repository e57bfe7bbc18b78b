//! Small helpers for auth validation and one-time token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

const RESERVED_USERNAMES: [&str; 4] = ["admin", "root", "user", "system"];

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Username rules: 4 to 20 characters, letters/digits/`_`/`.`/`-`, and not a
/// reserved word.
pub(super) fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(4..=20).contains(&len) {
        return Err("Username must be between 4 and 20 characters".to_string());
    }

    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !allowed {
        return Err(
            "Username may only contain letters, digits, underscores, dots, and hyphens"
                .to_string(),
        );
    }

    if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
        return Err("Username is reserved".to_string());
    }

    Ok(())
}

/// Password strength rules applied at registration, reset, and change.
pub(super) fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < 12 {
        return Err("Password must be at least 12 characters long".to_string());
    }
    if password.chars().any(char::is_whitespace) {
        return Err("Password must not contain whitespace".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit".to_string());
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Password must contain a special character".to_string());
    }
    if has_repeated_run(password) {
        return Err("Password must not repeat the same character three times".to_string());
    }
    if has_common_pattern(password) {
        return Err("Password must not contain common patterns".to_string());
    }
    Ok(())
}

/// Three or more identical characters in a row.
fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars
        .windows(3)
        .any(|window| window[0] == window[1] && window[1] == window[2])
}

fn has_common_pattern(password: &str) -> bool {
    let lowered = password.to_lowercase();
    ["password", "qwerty", "123456", "abcdef", "letmein"]
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// Create a one-time token for email links.
///
/// The raw token is only sent to the user; the database stores a hash.
pub(super) fn generate_one_time_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a verification token so the raw value never touches the database.
pub(super) fn hash_verification_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the frontend verification link included in outbound emails.
pub(super) fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email?token={token}")
}

/// Build the frontend password reset link included in outbound emails.
pub(super) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password?token={token}")
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
