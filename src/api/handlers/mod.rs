pub mod auth;
pub mod authorize;
pub mod health;
pub mod me;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::gateway::{utils::bearer_token, AccessGateway, GatewayError, Principal, TokenError};

/// Resolve the `Authorization: Bearer` header into a principal.
///
/// A missing or unparsable header is reported the same way as a bad token.
pub(crate) fn require_principal(
    headers: &HeaderMap,
    gateway: &AccessGateway,
) -> Result<Principal, GatewayError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(GatewayError::Token(TokenError::TokenFormat))?;
    gateway.authenticate(token)
}
