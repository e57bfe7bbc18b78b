//! # Konto (User Accounts & Authentication)
//!
//! `konto` is a user-account service: registration with email verification,
//! credential-based and Google OAuth login, JWT access/refresh token
//! issuance, password reset, and role-based admin operations. A profile row
//! is created alongside each account.
//!
//! ## Identity lifecycle
//!
//! Accounts start out unverified and cannot obtain a token pair via password
//! login until the emailed verification token is consumed. Verification and
//! password-reset tokens are opaque random strings, single use, time limited,
//! and stored only as hashes.
//!
//! ## Tokens
//!
//! Access tokens are short-lived (1 hour) stateless JWTs carrying
//! `{sub, role}`; no store lookup happens on the request path. Refresh
//! tokens are long-lived (7 days) JWTs whose current value is additionally
//! persisted on the user record (a single slot per user) so that logout and
//! re-login revoke everything issued before, despite JWTs being otherwise
//! unrevocable.
//!
//! ## Authorization
//!
//! Roles are `user` and `admin`. Admin endpoints layer a role check on top
//! of the bearer-token gate and return `403 Forbidden` when the role is
//! insufficient.

pub mod api;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
