//! Grant/deny/abstain voting over reachable roles
//!
//! The voter only has an opinion on attributes carrying its recognized prefix.
//! For those, the first attribute found among the principal's reachable roles
//! grants; seeing any recognized attribute without a match denies; seeing none
//! abstains.
//!
//! ```
//! use rolevote_authz::{Attribute, HierarchyResolver, Vote, Voter};
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! let resolver = Arc::new(HierarchyResolver::new());
//! resolver.build(&[], &BTreeSet::new())?;
//! let voter = Voter::new(resolver);
//!
//! let vote = voter.decide(&["EAB_X"], &[Attribute::from("EAB_X")], "EAB_");
//! assert_eq!(vote, Vote::Grant);
//! # Ok::<(), rolevote_authz::AuthzError>(())
//! ```

use crate::formatter::DEFAULT_ROLE_PREFIX;
use crate::hierarchy::{HierarchyResolver, ReachableRoles};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Grant,
    Deny,
    Abstain,
}

/// A requested permission attribute
///
/// Hosts may pass attributes that are not role names at all (expressions,
/// numbers, ...). Those are carried as `Other` and never voted on.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Name(String),
    Other(serde_json::Value),
}

impl Attribute {
    /// The attribute as a role name, if it is one
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Attribute::Name(name) => Some(name),
            Attribute::Other(_) => None,
        }
    }

    /// Convert a list of role names
    pub fn names<I, S>(names: I) -> Vec<Attribute>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(|n| Attribute::Name(n.into())).collect()
    }
}

impl From<&str> for Attribute {
    fn from(name: &str) -> Self {
        Attribute::Name(name.to_string())
    }
}

impl From<String> for Attribute {
    fn from(name: String) -> Self {
        Attribute::Name(name)
    }
}

impl From<serde_json::Value> for Attribute {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(name) => Attribute::Name(name),
            other => Attribute::Other(other),
        }
    }
}

/// Voter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterConfig {
    /// Prefix marking attributes this voter decides on
    pub prefix: String,

    /// Assigned roles that grant every recognized attribute
    pub super_roles: BTreeSet<String>,
}

impl Default for VoterConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_ROLE_PREFIX.to_string(),
            super_roles: BTreeSet::new(),
        }
    }
}

/// Role voter
///
/// Stateless apart from the resolver's memo; share it freely.
#[derive(Clone)]
pub struct Voter {
    resolver: Arc<HierarchyResolver>,
    config: VoterConfig,
}

impl Voter {
    /// Create a voter with the default prefix and no super roles
    pub fn new(resolver: Arc<HierarchyResolver>) -> Self {
        Self::with_config(resolver, VoterConfig::default())
    }

    pub fn with_config(resolver: Arc<HierarchyResolver>, config: VoterConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &VoterConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<HierarchyResolver> {
        &self.resolver
    }

    /// Whether the attribute carries the configured prefix
    pub fn supports_attribute(&self, attribute: &str) -> bool {
        attribute.starts_with(self.config.prefix.as_str())
    }

    /// Vote with the configured prefix
    pub fn vote<S: AsRef<str>>(&self, assigned: &[S], requested: &[Attribute]) -> Vote {
        self.decide(assigned, requested, &self.config.prefix)
    }

    /// Decide on `requested` for a principal holding `assigned`
    ///
    /// Never fails. If the hierarchy is not built, nothing is reachable and
    /// every recognized attribute is denied.
    pub fn decide<S: AsRef<str>>(&self, assigned: &[S], requested: &[Attribute], recognized_prefix: &str) -> Vote {
        let mut result = Vote::Abstain;
        let mut reachable: Option<ReachableRoles> = None;

        for attribute in requested {
            let Some(name) = attribute.as_name() else {
                continue;
            };
            if !name.starts_with(recognized_prefix) {
                continue;
            }

            if self.holds_super_role(assigned) {
                debug!(attribute = %name, "Access granted by super role");
                return Vote::Grant;
            }

            result = Vote::Deny;

            let roles = reachable.get_or_insert_with(|| self.reachable(assigned));
            if roles.contains(name) {
                debug!(attribute = %name, "Access granted");
                return Vote::Grant;
            }
        }

        debug!(vote = ?result, attributes = requested.len(), "Access vote");
        result
    }

    fn holds_super_role<S: AsRef<str>>(&self, assigned: &[S]) -> bool {
        !self.config.super_roles.is_empty()
            && assigned.iter().any(|role| self.config.super_roles.contains(role.as_ref()))
    }

    fn reachable<S: AsRef<str>>(&self, assigned: &[S]) -> ReachableRoles {
        match self.resolver.reachable(assigned.iter().map(AsRef::as_ref)) {
            Ok(roles) => roles,
            Err(e) => {
                error!(error = %e, "Role hierarchy unavailable, denying recognized attributes");
                Arc::new(BTreeSet::new())
            }
        }
    }
}
