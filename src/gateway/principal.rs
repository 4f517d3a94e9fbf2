//! Authenticated principal resolved from a bearer token.
//!
//! Identity and roles come straight from the validated token. The
//! organizational context (own Student/Faculty id, branch) is fetched from the
//! directory on first use and cached for the rest of the request, so a
//! principal never triggers more than one lookup.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{
    directory::{Directory, OrgContext},
    roles::Role,
};

#[derive(Clone)]
pub struct Principal {
    subject: String,
    roles: Vec<Role>,
    directory: Arc<dyn Directory>,
    context: Arc<OnceCell<Option<OrgContext>>>,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("subject", &self.subject)
            .field("roles", &self.roles)
            .field("context", &self.context.get())
            .finish_non_exhaustive()
    }
}

impl Principal {
    pub fn new(subject: String, roles: Vec<Role>, directory: Arc<dyn Directory>) -> Self {
        Self {
            subject,
            roles,
            directory,
            context: Arc::new(OnceCell::new()),
        }
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    #[must_use]
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }

    /// Resolve the organizational context, querying the directory at most once.
    ///
    /// A failed lookup is not cached; the caller decides whether to retry.
    ///
    /// # Errors
    /// Returns the directory error unchanged.
    pub async fn org_context(&self) -> Result<Option<&OrgContext>> {
        let context = self
            .context
            .get_or_try_init(|| async {
                self.directory
                    .find_principal_organizational_context(&self.subject)
                    .await
            })
            .await?;
        Ok(context.as_ref())
    }

    /// Whether the organizational lookup has already run.
    #[must_use]
    pub fn context_resolved(&self) -> bool {
        self.context.initialized()
    }
}
