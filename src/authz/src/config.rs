//! Access engine configuration loading and validation
//!
//! ```toml
//! [voter]
//! prefix = "EAB_"
//! super_roles = ["ROLE_ROOT"]
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//! key_prefix = "rolevote.access."
//!
//! [hierarchy]
//! memo_capacity = 10000
//!
//! [[hierarchy.rules]]
//! granting_role = "ROLE_ADMIN"
//! expansion = "/^EAB_/"
//!
//! [[hierarchy.rules]]
//! granting_role = "ROLE_EDITOR"
//! expansion = ["EAB_Articles", "EAB_Articles_edit"]
//! ```

use crate::cache::{CacheSettings, CachingRoleStore, TtlCache, DEFAULT_KEY_PREFIX};
use crate::error::{AuthzError, Result};
use crate::formatter::DEFAULT_ROLE_PREFIX;
use crate::hierarchy::{compile_pattern, Expansion, HierarchyRule, HierarchyRuleSource, MemoPolicy};
use crate::store::RoleSource;
use crate::voter::VoterConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Complete access engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub voter: VoterSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub hierarchy: HierarchySection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoterSection {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub super_roles: BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HierarchySection {
    /// Bound on memoized role sets; unbounded when absent
    #[serde(default)]
    pub memo_capacity: Option<usize>,
    #[serde(default)]
    pub rules: Vec<HierarchyRuleSource>,
}

impl Default for VoterSection {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            super_roles: BTreeSet::new(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_prefix() -> String { DEFAULT_ROLE_PREFIX.to_string() }
fn default_ttl_secs() -> u64 { 3600 }
fn default_key_prefix() -> String { DEFAULT_KEY_PREFIX.to_string() }

impl AccessConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AccessConfig = toml::from_str(contents)
            .map_err(|e| AuthzError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.voter.prefix.is_empty() {
            return Err(AuthzError::Config("voter prefix must not be empty".to_string()));
        }

        if self.cache.ttl_secs == 0 {
            return Err(AuthzError::Config("cache ttl_secs must be greater than zero".to_string()));
        }

        MemoPolicy::from_capacity(self.hierarchy.memo_capacity)?;

        for rule in &self.hierarchy.rules {
            if let Expansion::WildcardPattern(pattern) = HierarchyRule::parse(rule)?.expansion {
                compile_pattern(&rule.granting_role, &pattern)?;
            }
        }

        Ok(())
    }

    pub fn voter_config(&self) -> VoterConfig {
        VoterConfig {
            prefix: self.voter.prefix.clone(),
            super_roles: self.voter.super_roles.clone(),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            key_prefix: self.cache.key_prefix.clone(),
        }
    }

    pub fn memo_policy(&self) -> Result<MemoPolicy> {
        MemoPolicy::from_capacity(self.hierarchy.memo_capacity)
    }

    /// Wrap `backing` in a caching store unless caching is disabled
    pub fn role_source(
        &self,
        backing: Arc<dyn RoleSource>,
        external: Option<Arc<dyn TtlCache>>,
    ) -> Arc<dyn RoleSource> {
        if self.cache.enabled {
            Arc::new(CachingRoleStore::with_settings(backing, external, self.cache_settings()))
        } else {
            backing
        }
    }
}
