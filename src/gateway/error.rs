use chrono::TimeDelta;
use thiserror::Error;

use super::{policy::DenyReason, token::TokenError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("too many attempts")]
    RateLimited,
    #[error("account locked for another {}s", .retry_after.num_seconds())]
    LockedOut { retry_after: TimeDelta },
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token: {0}")]
    Token(#[from] TokenError),
    #[error("access denied: {0}")]
    Denied(DenyReason),
    #[error("invalid or expired reset token")]
    InvalidResetToken,
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("collaborator failure: {0:#}")]
    Collaborator(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whole seconds until a locked-out identity may retry, rounded up.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            Self::LockedOut { retry_after } => {
                let seconds = retry_after.num_seconds();
                let partial = *retry_after > TimeDelta::seconds(seconds);
                Some(if partial { seconds + 1 } else { seconds }.max(1))
            }
            _ => None,
        }
    }
}
