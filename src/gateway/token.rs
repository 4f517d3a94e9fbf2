//! HS256 bearer tokens carrying the subject and a snapshot of its roles.
//!
//! Tokens are `header.claims.signature`, each part base64url without padding.
//! Roles are captured at issuance; validation never re-reads them, so a role
//! change only takes effect once the old token expires.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

use super::{clock::Clock, config::GatewayConfig, roles::Role};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_ALG: &str = "HS256";
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: TOKEN_ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// What a valid token vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub subject: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Coarse class of a validation failure, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFailure {
    Expired,
    Malformed,
    Tampered,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("token issued in the future")]
    IssuedInFuture,
    #[error("signing secret must be at least {MIN_SECRET_BYTES} bytes")]
    WeakSecret,
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
}

impl TokenError {
    #[must_use]
    pub fn failure(&self) -> TokenFailure {
        match self {
            Self::Expired => TokenFailure::Expired,
            Self::InvalidSignature | Self::InvalidIssuer | Self::IssuedInFuture => {
                TokenFailure::Tampered
            }
            Self::TokenFormat
            | Self::Base64
            | Self::Json(_)
            | Self::UnsupportedAlg(_)
            | Self::WeakSecret
            | Self::ExpiryOutOfRange => TokenFailure::Malformed,
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub struct TokenService {
    secret: SecretString,
    issuer: String,
    ttl: TimeDelta,
    leeway: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"***")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// # Errors
    /// Returns `TokenError::WeakSecret` when the secret is shorter than
    /// [`MIN_SECRET_BYTES`].
    pub fn new(
        secret: SecretString,
        config: &GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        if secret.expose_secret().len() < MIN_SECRET_BYTES {
            return Err(TokenError::WeakSecret);
        }
        Ok(Self {
            secret,
            issuer: config.token_issuer().to_string(),
            ttl: config.token_ttl(),
            leeway: config.token_leeway(),
            clock,
        })
    }

    /// Sign a token for `subject` with a snapshot of `roles`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or the configured
    /// lifetime pushes the expiry past what a timestamp can hold.
    pub fn issue(&self, subject: &str, roles: &[Role]) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = self.mac(signing_input.as_bytes())?.finalize().into_bytes();
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

        Ok(IssuedToken {
            token: format!("{signing_input}.{signature_b64}"),
            expires_at,
        })
    }

    /// Verify signature, issuer and lifetime, then return subject and roles.
    ///
    /// # Errors
    /// Fails closed on any structural, signature or timing problem.
    pub fn validate(&self, token: &str) -> Result<TokenIdentity, TokenError> {
        let claims = self.validate_claims(token)?;
        Ok(TokenIdentity {
            subject: claims.sub,
            roles: claims.roles,
        })
    }

    /// Role claim of a valid token, without touching storage.
    ///
    /// # Errors
    /// Same failure modes as [`TokenService::validate`].
    pub fn decode_roles(&self, token: &str) -> Result<Vec<Role>, TokenError> {
        Ok(self.validate_claims(token)?.roles)
    }

    /// Full claim set of a valid token.
    ///
    /// # Errors
    /// Same failure modes as [`TokenService::validate`].
    pub fn validate_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != TOKEN_ALG {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        self.mac(signing_input.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if claims.iss != self.issuer {
            return Err(TokenError::InvalidIssuer);
        }

        let now = self.clock.now().timestamp();
        let leeway = self.leeway.num_seconds();
        if claims.iat > now.saturating_add(leeway) {
            return Err(TokenError::IssuedInFuture);
        }
        if now > claims.exp.saturating_add(leeway) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::WeakSecret)?;
        mac.update(input);
        Ok(mac)
    }
}
