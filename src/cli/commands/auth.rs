//! Auth-related CLI arguments: token secrets, frontend URL, Google OAuth,
//! and email outbox tuning.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_REDIRECT_URL: &str = "google-redirect-url";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_google_args(command);
    with_outbox_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("Signing secret for access tokens")
                .env("KONTO_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("Signing secret for refresh tokens (must differ from the access secret)")
                .env("KONTO_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for verification and reset links")
                .env("KONTO_FRONTEND_BASE_URL")
                .default_value("https://konto.dev"),
        )
}

fn with_google_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("KONTO_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("KONTO_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GOOGLE_REDIRECT_URL)
                .long(ARG_GOOGLE_REDIRECT_URL)
                .help("Redirect URL registered for the Google OAuth client")
                .env("KONTO_GOOGLE_REDIRECT_URL"),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("KONTO_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("KONTO_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("KONTO_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("KONTO_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("KONTO_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Google OAuth settings; present only when all three arguments are set.
#[derive(Debug, Clone)]
pub struct GoogleOptions {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug)]
pub struct Options {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub frontend_base_url: String,
    pub google: Option<GoogleOptions>,
    pub outbox: OutboxOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Extract auth options from parsed CLI matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let access_token_secret = matches
            .get_one::<String>(ARG_ACCESS_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --access-token-secret")?;
        let refresh_token_secret = matches
            .get_one::<String>(ARG_REFRESH_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --refresh-token-secret")?;
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;

        let google = match (
            matches.get_one::<String>(ARG_GOOGLE_CLIENT_ID),
            matches.get_one::<String>(ARG_GOOGLE_CLIENT_SECRET),
            matches.get_one::<String>(ARG_GOOGLE_REDIRECT_URL),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleOptions {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_url: redirect_url.clone(),
            }),
            _ => None,
        };

        let outbox = OutboxOptions {
            poll_seconds: matches
                .get_one::<u64>("email-outbox-poll-seconds")
                .copied()
                .unwrap_or(5),
            batch_size: matches
                .get_one::<usize>("email-outbox-batch-size")
                .copied()
                .unwrap_or(10),
            max_attempts: matches
                .get_one::<u32>("email-outbox-max-attempts")
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>("email-outbox-backoff-base-seconds")
                .copied()
                .unwrap_or(5),
            backoff_max_seconds: matches
                .get_one::<u64>("email-outbox-backoff-max-seconds")
                .copied()
                .unwrap_or(300),
        };

        Ok(Self {
            access_token_secret,
            refresh_token_secret,
            frontend_base_url,
            google,
            outbox,
        })
    }
}
