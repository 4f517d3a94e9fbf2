//! Portal roles carried in tokens and used by the policy engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Faculty => "FACULTY",
            Self::Student => "STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Accepts `ADMIN` as well as the `ROLE_ADMIN` authority spelling.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let name = trimmed.strip_prefix("ROLE_").unwrap_or(trimmed);
        match name.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "FACULTY" => Ok(Self::Faculty),
            "STUDENT" => Ok(Self::Student),
            _ => Err(UnknownRole(value.to_string())),
        }
    }
}

/// Parse stored role names, dropping anything that is not a known role.
///
/// The result is sorted and free of duplicates so issued claims are stable.
pub fn parse_role_names<I, S>(names: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut roles: Vec<Role> = names
        .into_iter()
        .filter_map(|name| match name.as_ref().parse::<Role>() {
            Ok(role) => Some(role),
            Err(err) => {
                tracing::warn!("ignoring stored role: {err}");
                None
            }
        })
        .collect();
    roles.sort_unstable();
    roles.dedup();
    roles
}
