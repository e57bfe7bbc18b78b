//! External identity providers (Google OAuth).

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::APP_USER_AGENT;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Identity asserted by an upstream provider after a successful code exchange.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Upstream identity provider, injected into `AuthState` so handlers never
/// talk to a concrete vendor directly.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL to redirect the browser to for consent.
    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Exchange an authorization code for the upstream identity.
    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity>;
}

pub struct GoogleProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

impl GoogleProvider {
    #[must_use]
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            client_id,
            client_secret,
            redirect_url,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    id: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(GOOGLE_AUTH_URL).context("invalid authorize URL")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", state);
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("token exchange request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "token exchange rejected with status {}",
                response.status()
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("invalid token exchange response")?;

        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("userinfo request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "userinfo rejected with status {}",
                response.status()
            ));
        }

        let info: UserInfo = response.json().await.context("invalid userinfo response")?;

        Ok(ProviderIdentity {
            provider_id: info.id,
            email: info.email,
            name: info.name,
            avatar_url: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_client_and_state() {
        let provider = GoogleProvider::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://konto.dev/v1/auth/google/callback".to_string(),
        );

        let url = provider.authorize_url("xyzzy").unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("accounts.google.com"));

        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".to_string(), "client-id".to_string())));
        assert!(pairs.contains(&("state".to_string(), "xyzzy".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(!url.contains("client-secret"));
    }
}
