//! Role data sources

use crate::error::Result;
use crate::hierarchy::HierarchyRuleSource;
use crate::registry::RoleRegistry;
use crate::types::{RoleDescriptor, RoleMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Conjunctive filter over role descriptors
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFilter {
    /// Role name must be one of these
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<BTreeSet<String>>,

    /// Role must be in this group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Role must be a member of this preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Role name must start with this prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

impl RoleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Check if a descriptor passes every set criterion
    pub fn matches(&self, role: &RoleDescriptor) -> bool {
        if let Some(names) = &self.names {
            if !names.contains(&role.name) {
                return false;
            }
        }

        if let Some(group) = &self.group {
            if role.group.as_deref() != Some(group.as_str()) {
                return false;
            }
        }

        if let Some(preset) = &self.preset {
            if !role.in_preset(preset) {
                return false;
            }
        }

        if let Some(prefix) = &self.name_prefix {
            if !role.name.starts_with(prefix.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Role data source trait
///
/// Implementations may block on I/O; the voter and the hierarchy resolver
/// never call a source during an authorization check.
#[async_trait]
pub trait RoleSource: Send + Sync {
    /// Prefix of the roles this source manages
    fn prefix(&self) -> &str;

    /// All role descriptors keyed by name
    async fn roles(&self) -> Result<Arc<RoleMap>>;

    /// All role names
    async fn role_names(&self) -> Result<BTreeSet<String>>;

    /// Get a role by name
    async fn role(&self, name: &str) -> Result<Option<RoleDescriptor>>;

    /// Find roles matching a filter, sorted by name
    async fn find_by(&self, filter: &RoleFilter) -> Result<Vec<RoleDescriptor>>;

    /// Hierarchy rules to build the resolver from
    async fn hierarchy_rules(&self) -> Result<Vec<HierarchyRuleSource>>;

    /// Drop any cached state; no-op for uncached sources
    async fn invalidate(&self) {}
}

/// Role source backed by a sealed in-memory registry
pub struct RegistryRoleSource {
    registry: Arc<RoleRegistry>,
    roles: Arc<RoleMap>,
    hierarchy: Vec<HierarchyRuleSource>,
}

impl RegistryRoleSource {
    /// Wrap a registry; the registry is sealed
    pub fn new(registry: Arc<RoleRegistry>, hierarchy: Vec<HierarchyRuleSource>) -> Self {
        registry.seal();
        let roles = Arc::new(registry.all().clone());

        Self {
            registry,
            roles,
            hierarchy,
        }
    }

    pub fn registry(&self) -> &Arc<RoleRegistry> {
        &self.registry
    }
}

#[async_trait]
impl RoleSource for RegistryRoleSource {
    fn prefix(&self) -> &str {
        self.registry.formatter().prefix()
    }

    async fn roles(&self) -> Result<Arc<RoleMap>> {
        Ok(Arc::clone(&self.roles))
    }

    async fn role_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.registry.names())
    }

    async fn role(&self, name: &str) -> Result<Option<RoleDescriptor>> {
        Ok(self.registry.get(name).cloned())
    }

    async fn find_by(&self, filter: &RoleFilter) -> Result<Vec<RoleDescriptor>> {
        Ok(self
            .registry
            .all()
            .values()
            .filter(|role| filter.matches(role))
            .cloned()
            .collect())
    }

    async fn hierarchy_rules(&self) -> Result<Vec<HierarchyRuleSource>> {
        Ok(self.hierarchy.clone())
    }
}
