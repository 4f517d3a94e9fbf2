//! Argon2id PHC-string hashing for stored account secrets.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::error;

use super::directory::CredentialVerifier;

/// Verifies and produces Argon2id hashes on the blocking pool.
#[derive(Clone, Debug)]
pub struct Argon2Verifier {
    params: Params,
}

impl Default for Argon2Verifier {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Argon2Verifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters, mainly for tests.
    ///
    /// # Errors
    /// Returns an error if the parameters are outside Argon2's bounds.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| anyhow!("invalid Argon2 parameters: {err}"))?;
        Ok(Self { params })
    }

    fn hasher(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }
}

#[async_trait]
impl CredentialVerifier for Argon2Verifier {
    async fn verify_secret(&self, plaintext: &SecretString, hash: &str) -> bool {
        let plaintext = plaintext.clone();
        let hash = hash.to_string();
        let params = self.params.clone();
        let verified = tokio::task::spawn_blocking(move || {
            // Verification reads the cost parameters from the PHC string.
            PasswordHash::new(&hash).is_ok_and(|parsed| {
                Self::hasher(params)
                    .verify_password(plaintext.expose_secret().as_bytes(), &parsed)
                    .is_ok()
            })
        })
        .await;

        verified.unwrap_or_else(|err| {
            error!("password verification task failed: {err}");
            false
        })
    }

    async fn hash_secret(&self, plaintext: &SecretString) -> Result<String> {
        let plaintext = plaintext.clone();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::hasher(params)
                .hash_password(plaintext.expose_secret().as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| anyhow!("failed to hash secret: {err}"))
        })
        .await
        .context("password hashing task failed")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> Result<Argon2Verifier> {
        Argon2Verifier::with_params(64, 1, 1)
    }

    #[tokio::test]
    async fn hash_then_verify() -> Result<()> {
        let verifier = verifier()?;
        let secret = SecretString::from("correct horse".to_string());
        let hash = verifier.hash_secret(&secret).await?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verifier.verify_secret(&secret, &hash).await);

        let wrong = SecretString::from("wrong horse".to_string());
        assert!(!verifier.verify_secret(&wrong, &hash).await);
        Ok(())
    }

    #[tokio::test]
    async fn hashes_are_salted() -> Result<()> {
        let verifier = verifier()?;
        let secret = SecretString::from("same".to_string());
        let first = verifier.hash_secret(&secret).await?;
        let second = verifier.hash_secret(&secret).await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_hash_never_verifies() -> Result<()> {
        let verifier = verifier()?;
        let secret = SecretString::from("pw".to_string());
        assert!(!verifier.verify_secret(&secret, "").await);
        assert!(!verifier.verify_secret(&secret, "plaintext-password").await);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_params() {
        assert!(Argon2Verifier::with_params(1, 1, 1).is_err());
    }
}
