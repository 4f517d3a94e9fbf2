//! # campusgate
//!
//! Access control gateway for the college portal. It decides whether a login
//! may proceed (per-identity rate limiting and account lockout), issues and
//! validates signed bearer tokens carrying identity and role claims, and turns
//! a token into allow/deny decisions for resources scoped by role, ownership
//! or branch.
//!
//! The [`gateway`] module holds the decision logic and is usable on its own
//! with any [`gateway::Directory`] and [`gateway::CredentialVerifier`]. The
//! [`api`] module exposes it over HTTP and [`cli`] wires the binary.

pub mod api;
pub mod cli;
pub mod gateway;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
