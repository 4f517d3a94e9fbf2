//! Allow/deny decisions for role, ownership and branch-scoped resources.
//!
//! Every protected resource is described by one [`Requirement`]. Role checks
//! are answered from the token alone; ownership and branch checks resolve the
//! principal's organizational context, at most once per principal. ADMIN
//! short-circuits role and branch checks before any lookup happens.

use serde::Deserialize;
use std::{fmt, future::Future, pin::Pin};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use super::{principal::Principal, roles::Role};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    RoleOnly(Vec<Role>),
    SelfOnly(i64),
    RoleOrSelf(Vec<Role>, i64),
    BranchScoped(i64),
    /// Allows when any inner requirement allows, checked in order.
    Any(Vec<Requirement>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    WrongRole,
    NotOwner,
    WrongBranch,
    MissingOrganizationalRecord,
    LookupFailed,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WrongRole => "wrong_role",
            Self::NotOwner => "not_owner",
            Self::WrongBranch => "wrong_branch",
            Self::MissingOrganizationalRecord => "missing_organizational_record",
            Self::LookupFailed => "lookup_failed",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Resource description supplied by a calling endpoint.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub required_roles: Vec<Role>,
    pub owner_id: Option<i64>,
    pub branch_id: Option<i64>,
}

impl ResourceDescriptor {
    /// Branch-scoped descriptors keep their required roles as an extra
    /// alternative, checked first so role holders never trigger a lookup.
    #[must_use]
    pub fn into_requirement(self) -> Requirement {
        let roles = self.required_roles;
        match (self.owner_id, self.branch_id) {
            (None, None) => Requirement::RoleOnly(roles),
            (Some(owner), None) if roles.is_empty() => Requirement::SelfOnly(owner),
            (Some(owner), None) => Requirement::RoleOrSelf(roles, owner),
            (None, Some(branch)) if roles.is_empty() => Requirement::BranchScoped(branch),
            (owner, Some(branch)) => {
                let mut alternatives = Vec::with_capacity(3);
                if !roles.is_empty() {
                    alternatives.push(Requirement::RoleOnly(roles));
                }
                alternatives.push(Requirement::BranchScoped(branch));
                if let Some(owner) = owner {
                    alternatives.push(Requirement::SelfOnly(owner));
                }
                Requirement::Any(alternatives)
            }
        }
    }
}

type DecisionFuture<'a> = Pin<Box<dyn Future<Output = Decision> + Send + 'a>>;

#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, principal), fields(subject = %principal.subject()))]
    pub async fn authorize(&self, principal: &Principal, requirement: &Requirement) -> Decision {
        let decision = self.evaluate(principal, requirement).await;
        if let Decision::Deny(reason) = decision {
            debug!(%reason, "access denied");
        }
        decision
    }

    fn evaluate<'a>(
        &'a self,
        principal: &'a Principal,
        requirement: &'a Requirement,
    ) -> DecisionFuture<'a> {
        Box::pin(async move {
            match requirement {
                Requirement::RoleOnly(allowed) => role_only(principal, allowed),
                Requirement::SelfOnly(owner_id) => self_only(principal, *owner_id).await,
                Requirement::RoleOrSelf(allowed, owner_id) => {
                    match role_only(principal, allowed) {
                        Decision::Allow => Decision::Allow,
                        Decision::Deny(_) => self_only(principal, *owner_id).await,
                    }
                }
                Requirement::BranchScoped(branch_id) => branch_scoped(principal, *branch_id).await,
                Requirement::Any(requirements) => {
                    let mut last = Decision::Deny(DenyReason::WrongRole);
                    for inner in requirements {
                        match self.evaluate(principal, inner).await {
                            Decision::Allow => return Decision::Allow,
                            deny => last = deny,
                        }
                    }
                    last
                }
            }
        })
    }
}

fn role_only(principal: &Principal, allowed: &[Role]) -> Decision {
    if principal.has_role(Role::Admin) || principal.has_any_role(allowed) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::WrongRole)
    }
}

async fn self_only(principal: &Principal, owner_id: i64) -> Decision {
    match principal.org_context().await {
        Ok(Some(context)) if context.numeric_id == owner_id => Decision::Allow,
        Ok(Some(_)) => Decision::Deny(DenyReason::NotOwner),
        Ok(None) => Decision::Deny(DenyReason::MissingOrganizationalRecord),
        Err(err) => {
            warn!("organizational lookup failed: {err:#}");
            Decision::Deny(DenyReason::LookupFailed)
        }
    }
}

async fn branch_scoped(principal: &Principal, branch_id: i64) -> Decision {
    if principal.has_role(Role::Admin) {
        return Decision::Allow;
    }
    if !principal.has_role(Role::Faculty) {
        return Decision::Deny(DenyReason::WrongRole);
    }
    match principal.org_context().await {
        Ok(Some(context)) if context.branch_id == Some(branch_id) => Decision::Allow,
        Ok(Some(_)) => Decision::Deny(DenyReason::WrongBranch),
        Ok(None) => Decision::Deny(DenyReason::MissingOrganizationalRecord),
        Err(err) => {
            warn!("organizational lookup failed: {err:#}");
            Decision::Deny(DenyReason::LookupFailed)
        }
    }
}
