//! Gateway tunables: rate window, lockout policy and token lifetime.

use chrono::TimeDelta;
use thiserror::Error;

use super::token::TokenError;

const DEFAULT_RATE_WINDOW_SECONDS: i64 = 60;
const DEFAULT_RATE_MAX_PER_WINDOW: u32 = 5;
const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_TOKEN_LEEWAY_SECONDS: i64 = 30;
const DEFAULT_TOKEN_ISSUER: &str = "campusgate";
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;

/// Upper bound for every configured duration: one year.
pub const MAX_DURATION_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be between {min} and {max} seconds, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error(transparent)]
    Token(#[from] TokenError),
}

fn check_range(name: &'static str, value: i64, min: i64) -> Result<(), ConfigError> {
    if (min..=MAX_DURATION_SECONDS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max: MAX_DURATION_SECONDS,
        })
    }
}

/// Out-of-range values saturate instead of panicking; `validate` rejects them.
fn duration(seconds: i64) -> TimeDelta {
    TimeDelta::try_seconds(seconds).unwrap_or(if seconds < 0 {
        TimeDelta::MIN
    } else {
        TimeDelta::MAX
    })
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    rate_window_seconds: i64,
    rate_max_per_window: u32,
    lockout_threshold: u32,
    lockout_seconds: i64,
    token_ttl_seconds: i64,
    token_leeway_seconds: i64,
    token_issuer: String,
    reset_token_ttl_seconds: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate_window_seconds: DEFAULT_RATE_WINDOW_SECONDS,
            rate_max_per_window: DEFAULT_RATE_MAX_PER_WINDOW,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            token_leeway_seconds: DEFAULT_TOKEN_LEEWAY_SECONDS,
            token_issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_rate_window_seconds(mut self, seconds: i64) -> Self {
        self.rate_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_max_per_window(mut self, max: u32) -> Self {
        self.rate_max_per_window = max;
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, failures: u32) -> Self {
        self.lockout_threshold = failures;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_leeway_seconds(mut self, seconds: i64) -> Self {
        self.token_leeway_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_issuer(mut self, issuer: String) -> Self {
        self.token_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    /// Check that every duration is within `0..=MAX_DURATION_SECONDS`
    /// (leeway) or `1..=MAX_DURATION_SECONDS` (everything else).
    ///
    /// # Errors
    /// Returns `ConfigError::OutOfRange` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("rate window", self.rate_window_seconds, 1)?;
        check_range("lockout duration", self.lockout_seconds, 1)?;
        check_range("token ttl", self.token_ttl_seconds, 1)?;
        check_range("token leeway", self.token_leeway_seconds, 0)?;
        check_range("reset token ttl", self.reset_token_ttl_seconds, 1)
    }

    #[must_use]
    pub fn rate_window(&self) -> TimeDelta {
        duration(self.rate_window_seconds)
    }

    #[must_use]
    pub fn rate_max_per_window(&self) -> u32 {
        self.rate_max_per_window
    }

    #[must_use]
    pub fn lockout_threshold(&self) -> u32 {
        self.lockout_threshold
    }

    #[must_use]
    pub fn lockout_duration(&self) -> TimeDelta {
        duration(self.lockout_seconds)
    }

    #[must_use]
    pub fn token_ttl(&self) -> TimeDelta {
        duration(self.token_ttl_seconds)
    }

    #[must_use]
    pub fn token_leeway(&self) -> TimeDelta {
        duration(self.token_leeway_seconds)
    }

    #[must_use]
    pub fn token_issuer(&self) -> &str {
        &self.token_issuer
    }

    #[must_use]
    pub fn reset_token_ttl(&self) -> TimeDelta {
        duration(self.reset_token_ttl_seconds)
    }
}
