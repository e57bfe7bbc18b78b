use crate::{
    api,
    api::handlers::auth::{AuthConfig, GoogleProvider, TokenKeys},
    cli::commands::auth::Options,
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.auth.frontend_base_url);

    let keys = TokenKeys::new(
        &SecretString::from(args.auth.access_token_secret),
        &SecretString::from(args.auth.refresh_token_secret),
    );

    let google = args.auth.google.map(|google| {
        Arc::new(GoogleProvider::new(
            google.client_id,
            google.client_secret,
            google.redirect_url,
        )) as Arc<dyn api::handlers::auth::IdentityProvider>
    });

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.auth.outbox.poll_seconds)
        .with_batch_size(args.auth.outbox.batch_size)
        .with_max_attempts(args.auth.outbox.max_attempts)
        .with_backoff_base_seconds(args.auth.outbox.backoff_base_seconds)
        .with_backoff_max_seconds(args.auth.outbox.backoff_max_seconds);

    api::serve(args.port, args.dsn, auth_config, keys, google, email_config).await
}
