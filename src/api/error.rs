//! HTTP mapping for gateway errors.
//!
//! Bodies stay uniform: token failures all read the same, and a
//! denial never says which rule failed.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::gateway::GatewayError;

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::LockedOut { .. } => StatusCode::LOCKED,
            Self::InvalidCredentials | Self::Token(_) => StatusCode::UNAUTHORIZED,
            Self::Denied(_) => StatusCode::FORBIDDEN,
            Self::InvalidResetToken | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Collaborator(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut headers = HeaderMap::new();
        let message = match &self {
            Self::RateLimited => "Too many attempts. Try again later.",
            Self::LockedOut { .. } => {
                if let Some(seconds) = self.retry_after_seconds() {
                    if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                        headers.insert(header::RETRY_AFTER, value);
                    }
                }
                "Account locked due to too many failed logins. Try again later."
            }
            Self::InvalidCredentials => "Invalid credentials",
            Self::Token(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                "Unauthorized"
            }
            Self::Denied(_) => "Forbidden",
            Self::InvalidResetToken => "Invalid or expired reset token",
            Self::InvalidRequest(message) => *message,
            Self::Collaborator(err) => {
                error!("Gateway collaborator failed: {err:#}");
                "Internal server error"
            }
        };
        (status, headers, message.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{DenyReason, TokenError};
    use chrono::TimeDelta;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(GatewayError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            GatewayError::LockedOut {
                retry_after: TimeDelta::minutes(1)
            }
            .status(),
            StatusCode::LOCKED
        );
        assert_eq!(GatewayError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::Token(TokenError::InvalidSignature).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Denied(DenyReason::NotOwner).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(GatewayError::InvalidResetToken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::Collaborator(anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn locked_out_carries_retry_after() {
        let response = GatewayError::LockedOut {
            retry_after: TimeDelta::seconds(90),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("90"))
        );
    }

    #[test]
    fn token_failures_share_one_response() {
        let expired = GatewayError::Token(TokenError::Expired).into_response();
        let tampered = GatewayError::Token(TokenError::InvalidSignature).into_response();
        assert_eq!(expired.status(), tampered.status());
        assert_eq!(
            expired.headers().get(header::WWW_AUTHENTICATE),
            tampered.headers().get(header::WWW_AUTHENTICATE)
        );
    }
}
