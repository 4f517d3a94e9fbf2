use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let token_secret = matches
        .get_one::<String>("token-secret")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --token-secret")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret,
        token_ttl_seconds: matches.get_one::<i64>("token-ttl").copied().unwrap_or(86_400),
        token_issuer: matches
            .get_one::<String>("token-issuer")
            .cloned()
            .unwrap_or_else(|| "campusgate".to_string()),
        token_leeway_seconds: matches.get_one::<i64>("token-leeway").copied().unwrap_or(30),
        rate_window_seconds: matches.get_one::<i64>("rate-window").copied().unwrap_or(60),
        rate_max_per_window: matches.get_one::<u32>("rate-max").copied().unwrap_or(5),
        lockout_threshold: matches
            .get_one::<u32>("lockout-threshold")
            .copied()
            .unwrap_or(5),
        lockout_minutes: matches
            .get_one::<i64>("lockout-minutes")
            .copied()
            .unwrap_or(15),
    }))
}
