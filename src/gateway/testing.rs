//! In-process collaborator doubles shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use super::directory::{CredentialVerifier, ResetMailer};

/// Treats stored hashes as plaintext and counts verifications.
#[derive(Debug, Default)]
pub(crate) struct PlainVerifier {
    calls: AtomicUsize,
}

impl PlainVerifier {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for PlainVerifier {
    async fn verify_secret(&self, plaintext: &SecretString, hash: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        plaintext.expose_secret() == hash
    }

    async fn hash_secret(&self, plaintext: &SecretString) -> Result<String> {
        Ok(plaintext.expose_secret().to_string())
    }
}

/// Keeps every reset token it is asked to deliver.
#[derive(Debug, Default)]
pub(crate) struct CapturingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturingMailer {
    pub(crate) fn last_token(&self) -> Option<String> {
        self.sent
            .lock()
            .ok()
            .and_then(|sent| sent.last().map(|(_, token)| token.clone()))
    }

    pub(crate) fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ResetMailer for CapturingMailer {
    async fn send_reset(&self, email: &str, token: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((email.to_string(), token.to_string()));
        }
        Ok(())
    }
}
