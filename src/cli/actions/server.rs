use crate::{
    api,
    gateway::{
        argon::Argon2Verifier, postgres::PgDirectory, AccessGateway, GatewayConfig, SystemClock,
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub token_issuer: String,
    pub token_leeway_seconds: i64,
    pub rate_window_seconds: i64,
    pub rate_max_per_window: u32,
    pub lockout_threshold: u32,
    pub lockout_minutes: i64,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("dsn", &redact_dsn(&self.dsn))
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("token_issuer", &self.token_issuer)
            .field("token_leeway_seconds", &self.token_leeway_seconds)
            .field("rate_window_seconds", &self.rate_window_seconds)
            .field("rate_max_per_window", &self.rate_max_per_window)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("lockout_minutes", &self.lockout_minutes)
            .finish_non_exhaustive()
    }
}

impl Args {
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new()
            .with_token_ttl_seconds(self.token_ttl_seconds)
            .with_token_issuer(self.token_issuer.clone())
            .with_token_leeway_seconds(self.token_leeway_seconds)
            .with_rate_window_seconds(self.rate_window_seconds)
            .with_rate_max_per_window(self.rate_max_per_window)
            .with_lockout_threshold(self.lockout_threshold)
            .with_lockout_seconds(self.lockout_minutes.saturating_mul(60))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the token secret is
/// rejected, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let gateway = AccessGateway::new(
        args.gateway_config(),
        args.token_secret,
        Arc::new(PgDirectory::new(pool.clone())),
        Arc::new(Argon2Verifier::new()),
        Arc::new(SystemClock),
    )
    .context("Invalid token secret")?;

    api::serve(args.port, Arc::new(gateway), pool).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("token_issuer", args.token_issuer.clone()),
        ("token_ttl", format!("{}s", args.token_ttl_seconds)),
        ("token_leeway", format!("{}s", args.token_leeway_seconds)),
        (
            "rate_limit",
            format!(
                "{} per {}s",
                args.rate_max_per_window, args.rate_window_seconds
            ),
        ),
        (
            "lockout",
            format!(
                "{} failures, {} minutes",
                args.lockout_threshold, args.lockout_minutes
            ),
        ),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
