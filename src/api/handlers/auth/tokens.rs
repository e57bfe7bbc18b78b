//! JWT access and refresh tokens.
//!
//! Access and refresh tokens are signed with two distinct HS256 secrets so a
//! leaked refresh secret cannot mint access tokens and vice versa. Refresh
//! tokens are additionally pinned to a single slot per user in the database,
//! which is what makes logout an effective revocation.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::storage::Role;
use super::utils::generate_one_time_token;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const OAUTH_STATE_TTL_SECONDS: i64 = 10 * 60;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims for the OAuth `state` round trip. The shape differs from [`Claims`]
/// on purpose: neither token kind decodes as the other.
#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    nonce: String,
    iat: i64,
    exp: i64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

pub struct TokenKeys {
    access: KeyPair,
    refresh: KeyPair,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys").finish_non_exhaustive()
    }
}

impl TokenKeys {
    #[must_use]
    pub fn new(access_secret: &SecretString, refresh_secret: &SecretString) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
        }
    }

    /// Sign a short-lived access token for the given user.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn sign_access_token(&self, user_id: Uuid, role: Role) -> Result<String> {
        sign(&self.access.encoding, user_id, role, ACCESS_TOKEN_TTL_SECONDS)
    }

    /// Sign a refresh token for the given user.
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails.
    pub fn sign_refresh_token(&self, user_id: Uuid, role: Role) -> Result<String> {
        sign(
            &self.refresh.encoding,
            user_id,
            role,
            REFRESH_TOKEN_TTL_SECONDS,
        )
    }

    /// Verify an access token signature and expiry, returning its claims.
    pub fn verify_access_token(&self, token: &str) -> Option<Claims> {
        verify(&self.access.decoding, token)
    }

    /// Verify a refresh token signature and expiry, returning its claims.
    pub fn verify_refresh_token(&self, token: &str) -> Option<Claims> {
        verify(&self.refresh.decoding, token)
    }

    /// Sign a short-lived `state` value for the OAuth redirect round trip.
    ///
    /// # Errors
    /// Returns an error if nonce generation or JWT encoding fails.
    pub fn sign_oauth_state(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = StateClaims {
            nonce: generate_one_time_token()?,
            iat: now,
            exp: now + OAUTH_STATE_TTL_SECONDS,
        };

        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &self.access.encoding,
        )
        .context("Failed to sign state token")
    }

    /// Check that a returned OAuth `state` was minted here and is unexpired.
    #[must_use]
    pub fn verify_oauth_state(&self, state: &str) -> bool {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<StateClaims>(state, &self.access.decoding, &validation).is_ok()
    }
}

fn sign(key: &EncodingKey, user_id: Uuid, role: Role, ttl_seconds: i64) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role,
        iat: now,
        exp: now + ttl_seconds,
    };

    jsonwebtoken::encode(&jsonwebtoken::Header::new(Algorithm::HS256), &claims, key)
        .context("Failed to sign JWT")
}

fn verify(key: &DecodingKey, token: &str) -> Option<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<Claims>(token, key, &validation)
        .ok()
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new(
            &SecretString::from("access-secret"),
            &SecretString::from("refresh-secret"),
        )
    }

    #[test]
    fn access_token_round_trips() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_access_token(user_id, Role::User).unwrap();

        let claims = keys.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_TTL_SECONDS);
    }

    #[test]
    fn refresh_token_round_trips() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh_token(user_id, Role::Admin).unwrap();

        let claims = keys.verify_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, REFRESH_TOKEN_TTL_SECONDS);
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let keys = keys();
        let user_id = Uuid::new_v4();

        let access = keys.sign_access_token(user_id, Role::User).unwrap();
        let refresh = keys.sign_refresh_token(user_id, Role::User).unwrap();

        assert!(keys.verify_refresh_token(&access).is_none());
        assert!(keys.verify_access_token(&refresh).is_none());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let keys = keys();
        let token = keys.sign_access_token(Uuid::new_v4(), Role::User).unwrap();

        let mut tampered = token.into_bytes();
        let last = tampered.last_mut().unwrap();
        *last = if *last == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();

        assert!(keys.verify_access_token(&tampered).is_none());
    }

    #[test]
    fn oauth_state_round_trips() {
        let keys = keys();
        let state = keys.sign_oauth_state().unwrap();
        assert!(keys.verify_oauth_state(&state));
    }

    #[test]
    fn oauth_state_is_not_interchangeable_with_tokens() {
        let keys = keys();

        let access = keys.sign_access_token(Uuid::new_v4(), Role::User).unwrap();
        assert!(!keys.verify_oauth_state(&access));

        let state = keys.sign_oauth_state().unwrap();
        assert!(keys.verify_access_token(&state).is_none());

        let other = TokenKeys::new(&SecretString::from("x"), &SecretString::from("y"));
        assert!(!other.verify_oauth_state(&state));
    }

    #[test]
    fn other_secret_is_rejected() {
        let keys = keys();
        let other = TokenKeys::new(
            &SecretString::from("different"),
            &SecretString::from("secrets"),
        );
        let token = keys.sign_access_token(Uuid::new_v4(), Role::User).unwrap();
        assert!(other.verify_access_token(&token).is_none());
    }
}
