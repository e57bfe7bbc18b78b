//! Tracing subscriber setup shared by the binary and the tests.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// An explicit verbosity level (from `-v` flags or `KONTO_LOG_LEVEL`) wins;
/// otherwise `RUST_LOG` is honored with `error` as the floor.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(level: Option<Level>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
