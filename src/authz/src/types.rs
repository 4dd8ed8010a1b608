//! Core role types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role name
pub type RoleName = String;

/// Free-form options attached to a role declaration
pub type RoleOptions = BTreeMap<String, serde_json::Value>;

/// Role descriptors keyed by role name
pub type RoleMap = BTreeMap<RoleName, RoleDescriptor>;

/// A named permission unit, as produced by the registry
///
/// Identity is `name`; descriptors are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    /// Canonical role name (e.g., "EAB_AppControllerUsers_edit")
    pub name: RoleName,

    /// Human-readable title
    pub title: String,

    /// Custom options declared with the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RoleOptions>,

    /// Group the role is listed under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Presets the role belongs to, in declaration order
    #[serde(default)]
    pub presets: Vec<String>,
}

impl RoleDescriptor {
    /// Whether the role is a member of the given preset
    pub fn in_preset(&self, preset: &str) -> bool {
        self.presets.iter().any(|p| p == preset)
    }
}

/// One declared permission rule, as handed over by the host's scanner
///
/// The registry derives the role name from `subject_id` and `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Protected resource identifier (e.g., "App\\Controller\\Users")
    pub subject_id: String,

    /// Protected action of the resource, if the rule is action-level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Human-readable title
    pub title: String,

    /// Custom options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RoleOptions>,

    /// Group name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Preset names
    #[serde(default)]
    pub presets: Vec<String>,
}

impl RoleRule {
    /// Create a resource-level rule
    pub fn new(subject_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            action: None,
            title: title.into(),
            options: None,
            group: None,
            presets: Vec::new(),
        }
    }

    /// Narrow the rule to a single action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attach options
    pub fn with_options(mut self, options: RoleOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Attach a group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Attach presets
    pub fn with_presets<I, S>(mut self, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets = presets.into_iter().map(Into::into).collect();
        self
    }
}
