use crate::cli::{
    actions::{Action, server},
    commands::{ARG_DSN, ARG_PORT, auth},
};
use anyhow::{Context, Result};
use clap::ArgMatches;

/// Map parsed CLI matches to the action to execute.
///
/// # Errors
///
/// Returns an error if required arguments are missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(ARG_PORT)
        .copied()
        .context("missing required argument: --port")?;

    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth = auth::Options::parse(matches)?;

    Ok(Action::Server(Box::new(server::Args { port, dsn, auth })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn test_handler_builds_server_action() {
        let matches = commands::new()
            .try_get_matches_from(vec![
                "konto",
                "--dsn",
                "postgres://konto@localhost/konto",
                "--access-token-secret",
                "access-secret",
                "--refresh-token-secret",
                "refresh-secret",
                "--port",
                "8443",
            ])
            .unwrap();

        let Action::Server(args) = handler(&matches).unwrap();
        assert_eq!(args.port, 8443);
        assert_eq!(args.dsn, "postgres://konto@localhost/konto");
        assert_eq!(args.auth.access_token_secret, "access-secret");
        assert!(args.auth.google.is_none());
    }
}
