//! Auth state and configuration shared across handlers.

use std::sync::Arc;

use super::{oauth::IdentityProvider, tokens::TokenKeys};

const DEFAULT_VERIFY_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESEND_VERIFY_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    verify_token_ttl_seconds: i64,
    resend_verify_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            verify_token_ttl_seconds: DEFAULT_VERIFY_TOKEN_TTL_SECONDS,
            resend_verify_token_ttl_seconds: DEFAULT_RESEND_VERIFY_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_verify_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_verify_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.resend_verify_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn verify_token_ttl_seconds(&self) -> i64 {
        self.verify_token_ttl_seconds
    }

    pub(super) fn resend_verify_token_ttl_seconds(&self) -> i64 {
        self.resend_verify_token_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    keys: TokenKeys,
    google: Option<Arc<dyn IdentityProvider>>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        keys: TokenKeys,
        google: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            config,
            keys,
            google,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub(super) fn google(&self) -> Option<&Arc<dyn IdentityProvider>> {
        self.google.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://konto.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://konto.dev");
        assert_eq!(
            config.verify_token_ttl_seconds(),
            DEFAULT_VERIFY_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.resend_verify_token_ttl_seconds(),
            DEFAULT_RESEND_VERIFY_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            DEFAULT_RESET_TOKEN_TTL_SECONDS
        );

        let config = config
            .with_verify_token_ttl_seconds(120)
            .with_resend_verify_token_ttl_seconds(240)
            .with_reset_token_ttl_seconds(360);

        assert_eq!(config.verify_token_ttl_seconds(), 120);
        assert_eq!(config.resend_verify_token_ttl_seconds(), 240);
        assert_eq!(config.reset_token_ttl_seconds(), 360);
    }

    #[test]
    fn auth_state_without_google_provider() {
        let config = AuthConfig::new("https://konto.dev".to_string());
        let keys = TokenKeys::new(&SecretString::from("a"), &SecretString::from("r"));
        let state = AuthState::new(config, keys, None);
        assert!(state.google().is_none());
    }
}
