//! Access control gateway.
//!
//! Flow Overview:
//! 1) Login: rate gate (`login:<email>`), lockout check, credential lookup and
//!    verification, then either clear failures and issue a token or record a
//!    failure.
//! 2) Password reset: rate gate (`reset:<email>`), store the hash of a random
//!    token, deliver the raw token, later consume it and rehash the secret.
//! 3) Every protected request: validate the bearer token into a
//!    [`Principal`] and ask the [`PolicyEngine`] for a decision.
//!
//! Rate and lockout state is in memory only. Directory and verifier calls
//! never run while any of that state is locked.

pub mod argon;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod keyed;
pub mod lockout;
pub mod policy;
pub mod postgres;
pub mod principal;
pub mod rate_gate;
pub mod roles;
pub mod token;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::anyhow;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

pub use self::{
    clock::{Clock, ManualClock, SystemClock},
    config::{ConfigError, GatewayConfig},
    directory::{CredentialVerifier, Directory, LogMailer, OrgContext, ResetMailer},
    error::GatewayError,
    lockout::LockoutTracker,
    policy::{Decision, DenyReason, PolicyEngine, Requirement, ResourceDescriptor},
    principal::Principal,
    rate_gate::{RateGate, RateLimitAction, RateLimitDecision, RateLimiter},
    roles::Role,
    token::{IssuedToken, TokenError, TokenService},
};

use self::utils::{generate_reset_token, hash_reset_token, normalize_email, valid_email};

pub struct AccessGateway {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    rate_gate: RateGate,
    lockout: LockoutTracker,
    tokens: TokenService,
    policy: PolicyEngine,
    directory: Arc<dyn Directory>,
    verifier: Arc<dyn CredentialVerifier>,
    mailer: Arc<dyn ResetMailer>,
    // Hash of a random secret, verified for unknown accounts so they cost
    // the same as known ones.
    decoy_hash: OnceCell<String>,
}

impl AccessGateway {
    /// # Errors
    /// Returns `ConfigError::OutOfRange` for a duration outside the accepted
    /// bounds and `ConfigError::Token` when the signing secret is too short.
    pub fn new(
        config: GatewayConfig,
        secret: SecretString,
        directory: Arc<dyn Directory>,
        verifier: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tokens = TokenService::new(secret, &config, clock.clone())?;
        Ok(Self {
            rate_gate: RateGate::new(
                clock.clone(),
                config.rate_window(),
                config.rate_max_per_window(),
            ),
            lockout: LockoutTracker::new(
                clock.clone(),
                config.lockout_threshold(),
                config.lockout_duration(),
            ),
            tokens,
            policy: PolicyEngine::new(),
            directory,
            verifier,
            mailer: Arc::new(LogMailer),
            decoy_hash: OnceCell::new(),
            clock,
            config,
        })
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn ResetMailer>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutTracker {
        &self.lockout
    }

    #[must_use]
    pub fn rate_gate(&self) -> &RateGate {
        &self.rate_gate
    }

    /// Exchange an email and password for a signed token.
    ///
    /// Unknown accounts and wrong passwords both count as failures and both
    /// return `InvalidCredentials`. Directory errors are not counted.
    ///
    /// # Errors
    /// `RateLimited`, `LockedOut`, `InvalidCredentials`, `InvalidRequest` or
    /// `Collaborator`.
    #[instrument(skip_all, fields(email))]
    pub async fn login(
        &self,
        identifier: &str,
        secret: &SecretString,
    ) -> Result<IssuedToken, GatewayError> {
        let email = normalize_email(identifier);
        tracing::Span::current().record("email", email.as_str());
        if !valid_email(&email) {
            return Err(GatewayError::InvalidRequest("invalid email"));
        }

        if self.rate_gate.check_email(&email, RateLimitAction::Login) == RateLimitDecision::Limited {
            return Err(GatewayError::RateLimited);
        }

        if let Some(retry_after) = self.lockout.remaining(&email) {
            debug!("login refused while locked out");
            return Err(GatewayError::LockedOut { retry_after });
        }

        let credential = self.directory.find_credential(&email).await?;
        let verified = match &credential {
            Some(credential) if !secret.expose_secret().is_empty() => {
                self.verifier
                    .verify_secret(secret, &credential.secret_hash)
                    .await
            }
            None if !secret.expose_secret().is_empty() => {
                self.verify_decoy(secret).await;
                false
            }
            _ => false,
        };

        match credential {
            Some(credential) if verified => {
                self.lockout.record_success(&email);
                let issued = self
                    .tokens
                    .issue(&credential.subject, &credential.roles)
                    .map_err(|err| GatewayError::Collaborator(anyhow!(err)))?;
                info!(roles = ?credential.roles, "login succeeded");
                Ok(issued)
            }
            _ => {
                self.lockout.record_failure(&email);
                Err(GatewayError::InvalidCredentials)
            }
        }
    }

    async fn verify_decoy(&self, secret: &SecretString) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| async {
                match generate_reset_token() {
                    Ok(plaintext) => self.verifier.hash_secret(&plaintext.into()).await,
                    Err(err) => Err(err),
                }
            })
            .await;
        match decoy {
            Ok(hash) => {
                self.verifier.verify_secret(secret, hash).await;
            }
            Err(err) => warn!("failed to prepare decoy hash: {err:#}"),
        }
    }

    /// Start a password reset. The outcome is the same whether or not an
    /// account exists for `identifier`.
    ///
    /// # Errors
    /// `RateLimited`, `InvalidRequest` or `Collaborator`.
    #[instrument(skip_all, fields(email))]
    pub async fn request_password_reset(&self, identifier: &str) -> Result<(), GatewayError> {
        let email = normalize_email(identifier);
        tracing::Span::current().record("email", email.as_str());
        if !valid_email(&email) {
            return Err(GatewayError::InvalidRequest("invalid email"));
        }

        if self
            .rate_gate
            .check_email(&email, RateLimitAction::PasswordReset)
            == RateLimitDecision::Limited
        {
            return Err(GatewayError::RateLimited);
        }

        let token = generate_reset_token()?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.config.reset_token_ttl())
            .ok_or_else(|| anyhow!("reset token expiry out of range"))?;
        let stored = self
            .directory
            .store_reset_token(&email, &hash_reset_token(&token), expires_at)
            .await?;
        if stored {
            self.mailer.send_reset(&email, &token).await?;
        } else {
            debug!("password reset requested for unknown account");
        }
        Ok(())
    }

    /// Consume a reset token and replace the account secret.
    ///
    /// A successful reset also lifts any lockout on the account.
    ///
    /// # Errors
    /// `InvalidResetToken`, `InvalidRequest` or `Collaborator`.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        token: &str,
        new_secret: &SecretString,
    ) -> Result<(), GatewayError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(GatewayError::InvalidResetToken);
        }
        if new_secret.expose_secret().is_empty() {
            return Err(GatewayError::InvalidRequest("password must not be empty"));
        }

        let email = self
            .directory
            .consume_reset_token(&hash_reset_token(token), self.clock.now())
            .await?
            .ok_or(GatewayError::InvalidResetToken)?;

        let secret_hash = self.verifier.hash_secret(new_secret).await?;
        self.directory.update_secret_hash(&email, &secret_hash).await?;
        self.lockout.record_success(&email);
        info!(email = %email, "password reset completed");
        Ok(())
    }

    /// Validate a bearer token into a principal bound to the directory.
    ///
    /// # Errors
    /// `Token` for any validation failure.
    pub fn authenticate(&self, token: &str) -> Result<Principal, GatewayError> {
        let identity = self.tokens.validate(token).map_err(|err| {
            debug!(failure = ?err.failure(), "token rejected: {err}");
            GatewayError::Token(err)
        })?;
        Ok(Principal::new(
            identity.subject,
            identity.roles,
            self.directory.clone(),
        ))
    }

    /// # Errors
    /// `Denied` with the reason when the policy does not allow access.
    pub async fn authorize(
        &self,
        principal: &Principal,
        requirement: &Requirement,
    ) -> Result<(), GatewayError> {
        match self.policy.authorize(principal, requirement).await {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(GatewayError::Denied(reason)),
        }
    }
}
