//! Auth handlers and supporting modules.
//!
//! This module coordinates the account lifecycle (register, verify, login,
//! refresh, logout), password reset, Google OAuth, account self-service, and
//! admin operations.
//!
//! ## Token model
//!
//! Access and refresh JWTs are signed with two distinct HS256 secrets. The
//! refresh token additionally occupies a single database slot per user:
//! login overwrites it, logout clears it, and the refresh endpoint requires
//! an exact match against the slot. A valid signature alone is never enough.

pub(crate) mod admin;
pub(crate) mod google;
pub(crate) mod login;
pub(crate) mod me;
mod oauth;
mod password;
pub(crate) mod password_reset;
pub(crate) mod principal;
pub(crate) mod register;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod tokens;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use oauth::{GoogleProvider, IdentityProvider, ProviderIdentity};
pub use principal::Principal;
pub use state::{AuthConfig, AuthState};
pub use storage::Role;
pub use tokens::TokenKeys;
