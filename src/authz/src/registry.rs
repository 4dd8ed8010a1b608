//! Static role registry
//!
//! Populated once during startup from declared rules, then sealed. After the
//! seal the registry is read-only and is shared as `Arc<RoleRegistry>`; reads
//! take no locks.

use crate::declaration::ResourceDeclaration;
use crate::error::{AuthzError, Result};
use crate::formatter::RoleNameFormatter;
use crate::types::{RoleDescriptor, RoleMap, RoleRule};
use std::collections::btree_map::Entry;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// In-memory mapping of role name to descriptor
#[derive(Debug, Default)]
pub struct RoleRegistry {
    formatter: RoleNameFormatter,
    roles: RoleMap,
    sealed: AtomicBool,
}

impl RoleRegistry {
    /// Create an empty registry using the default role prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with a custom formatter
    pub fn with_formatter(formatter: RoleNameFormatter) -> Self {
        Self {
            formatter,
            roles: RoleMap::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Formatter used to derive role names
    pub fn formatter(&self) -> &RoleNameFormatter {
        &self.formatter
    }

    /// Register a rule, overwriting any earlier rule with the same role name
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::RegistryFrozen` once the registry is sealed.
    pub fn register(&mut self, rule: RoleRule) -> Result<&RoleDescriptor> {
        let name = self.formatter.format(&rule.subject_id, rule.action.as_deref());

        if self.is_sealed() {
            return Err(AuthzError::RegistryFrozen(name));
        }

        let descriptor = RoleDescriptor {
            name: name.clone(),
            title: rule.title,
            options: rule.options,
            group: rule.group,
            presets: rule.presets,
        };

        match self.roles.entry(name) {
            Entry::Occupied(mut entry) => {
                debug!(role = %entry.key(), "Role re-declared, replacing earlier declaration");
                entry.insert(descriptor);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                debug!(role = %entry.key(), "Role registered");
                Ok(entry.insert(descriptor))
            }
        }
    }

    /// Register every rule in order
    pub fn register_all<I>(&mut self, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = RoleRule>,
    {
        for rule in rules {
            self.register(rule)?;
        }
        Ok(())
    }

    /// Register the rules derived from resource declarations
    pub fn register_declarations<I>(&mut self, declarations: I) -> Result<()>
    where
        I: IntoIterator<Item = ResourceDeclaration>,
    {
        for declaration in declarations {
            self.register_all(declaration.into_rules())?;
        }
        Ok(())
    }

    /// Reject all further registrations
    ///
    /// Idempotent.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            info!(roles = self.roles.len(), "Role registry sealed");
        }
    }

    /// Whether the registry rejects writes
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// All descriptors keyed by name
    pub fn all(&self) -> &RoleMap {
        &self.roles
    }

    /// Look up a descriptor
    pub fn get(&self, name: &str) -> Option<&RoleDescriptor> {
        self.roles.get(name)
    }

    /// All registered role names
    pub fn names(&self) -> BTreeSet<String> {
        self.roles.keys().cloned().collect()
    }

    /// Whether a role is registered
    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    /// Number of registered roles
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no role is registered
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
