//! Collaborators the gateway consumes but does not own.
//!
//! The CRUD layer owns users, roles, students and faculty. The gateway only
//! needs to read a stored credential, resolve the acting principal's own
//! Student/Faculty row, and keep password-reset tokens. Secret hashing is
//! equally opaque: the gateway only asks whether a plaintext matches.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use utoipa::ToSchema;

use super::roles::{parse_role_names, Role};

/// Stored login material for one account.
#[derive(Clone, Debug)]
pub struct StoredCredential {
    pub subject: String,
    pub secret_hash: String,
    pub roles: Vec<Role>,
}

/// The acting principal's own position in the organization.
///
/// `numeric_id` is the id of the principal's Student or Faculty row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrgContext {
    pub numeric_id: i64,
    pub role_names: Vec<String>,
    pub branch_id: Option<i64>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_credential(&self, email: &str) -> Result<Option<StoredCredential>>;

    /// `Ok(None)` when the subject has neither a Student nor a Faculty row.
    async fn find_principal_organizational_context(
        &self,
        subject: &str,
    ) -> Result<Option<OrgContext>>;

    /// Returns `false` when no account exists for `email`.
    async fn store_reset_token(
        &self,
        email: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Removes a matching unexpired token and returns the account email.
    async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<String>>;

    async fn update_secret_hash(&self, email: &str, secret_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_secret(&self, plaintext: &SecretString, hash: &str) -> bool;

    async fn hash_secret(&self, plaintext: &SecretString) -> Result<String>;
}

/// Delivers password-reset tokens to account holders.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset(&self, email: &str, token: &str) -> Result<()>;
}

/// Writes reset tokens to the debug log until a real mail worker exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send_reset(&self, email: &str, token: &str) -> Result<()> {
        tracing::debug!(email = %email, token = %token, "password reset token issued");
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct MemoryAccount {
    secret_hash: String,
    role_names: Vec<String>,
    numeric_id: Option<i64>,
    branch_id: Option<i64>,
    reset: Option<(Vec<u8>, DateTime<Utc>)>,
}

/// In-process directory for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    accounts: RwLock<HashMap<String, MemoryAccount>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account. `numeric_id` is `None` for accounts without
    /// a Student or Faculty row.
    pub fn insert(
        &self,
        email: &str,
        secret_hash: &str,
        role_names: &[&str],
        numeric_id: Option<i64>,
        branch_id: Option<i64>,
    ) {
        let account = MemoryAccount {
            secret_hash: secret_hash.to_string(),
            role_names: role_names.iter().map(ToString::to_string).collect(),
            numeric_id,
            branch_id,
            reset: None,
        };
        self.accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(email.to_string(), account);
    }

    /// Change stored roles without touching tokens already issued.
    pub fn set_roles(&self, email: &str, role_names: &[&str]) {
        if let Some(account) = self
            .accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(email)
        {
            account.role_names = role_names.iter().map(ToString::to_string).collect();
        }
    }

    #[must_use]
    pub fn secret_hash(&self, email: &str) -> Option<String> {
        self.accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(email)
            .map(|account| account.secret_hash.clone())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn find_credential(&self, email: &str) -> Result<Option<StoredCredential>> {
        let accounts = self
            .accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(accounts.get(email).map(|account| StoredCredential {
            subject: email.to_string(),
            secret_hash: account.secret_hash.clone(),
            roles: parse_role_names(&account.role_names),
        }))
    }

    async fn find_principal_organizational_context(
        &self,
        subject: &str,
    ) -> Result<Option<OrgContext>> {
        let accounts = self
            .accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(accounts.get(subject).and_then(|account| {
            account.numeric_id.map(|numeric_id| OrgContext {
                numeric_id,
                role_names: account.role_names.clone(),
                branch_id: account.branch_id,
            })
        }))
    }

    async fn store_reset_token(
        &self,
        email: &str,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(accounts.get_mut(email).map_or(false, |account| {
            account.reset = Some((token_hash.to_vec(), expires_at));
            true
        }))
    }

    async fn consume_reset_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (email, account) in accounts.iter_mut() {
            let matches = account
                .reset
                .as_ref()
                .is_some_and(|(hash, expires_at)| hash == token_hash && now < *expires_at);
            if matches {
                account.reset = None;
                return Ok(Some(email.clone()));
            }
        }
        Ok(None)
    }

    async fn update_secret_hash(&self, email: &str, secret_hash: &str) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match accounts.get_mut(email) {
            Some(account) => {
                account.secret_hash = secret_hash.to_string();
                Ok(())
            }
            None => Err(anyhow::anyhow!("no account for {email}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn directory() -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        directory.insert("s@x.com", "pw", &["STUDENT"], Some(7), Some(1));
        directory.insert("root@x.com", "pw", &["ADMIN"], None, None);
        directory
    }

    #[tokio::test]
    async fn finds_credentials_with_parsed_roles() -> Result<()> {
        let directory = directory();
        let credential = directory.find_credential("s@x.com").await?;
        let credential = credential.ok_or_else(|| anyhow::anyhow!("missing"))?;
        assert_eq!(credential.subject, "s@x.com");
        assert_eq!(credential.roles, vec![Role::Student]);
        assert!(directory.find_credential("nobody@x.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn org_context_requires_a_domain_row() -> Result<()> {
        let directory = directory();
        let context = directory
            .find_principal_organizational_context("s@x.com")
            .await?;
        assert_eq!(
            context,
            Some(OrgContext {
                numeric_id: 7,
                role_names: vec!["STUDENT".to_string()],
                branch_id: Some(1),
            })
        );
        assert!(directory
            .find_principal_organizational_context("root@x.com")
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reset_tokens_are_single_use_and_expire() -> Result<()> {
        let directory = directory();
        let now = Utc::now();
        assert!(
            directory
                .store_reset_token("s@x.com", b"hash", now + TimeDelta::minutes(30))
                .await?
        );
        assert!(
            !directory
                .store_reset_token("nobody@x.com", b"hash", now)
                .await?
        );

        assert_eq!(
            directory
                .consume_reset_token(b"hash", now + TimeDelta::minutes(30))
                .await?,
            None
        );
        assert_eq!(
            directory.consume_reset_token(b"hash", now).await?,
            Some("s@x.com".to_string())
        );
        assert_eq!(directory.consume_reset_token(b"hash", now).await?, None);
        Ok(())
    }
}
