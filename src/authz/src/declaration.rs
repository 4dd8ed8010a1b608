//! Protected-resource declarations
//!
//! A host scanner reports each protected resource together with its protected
//! actions. Actions inherit the resource's group and presets unless they
//! declare their own. The resource itself only yields a rule when it is
//! protected as a whole (it carries a title).

use crate::types::{RoleOptions, RoleRule};
use serde::{Deserialize, Serialize};

/// A protected action of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDeclaration {
    /// Action name (e.g., "edit")
    pub name: String,

    /// Human-readable title
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RoleOptions>,

    /// Overrides the resource group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Overrides the resource presets when non-empty
    #[serde(default)]
    pub presets: Vec<String>,
}

impl ActionDeclaration {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            options: None,
            group: None,
            presets: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RoleOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_presets<I, S>(mut self, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets = presets.into_iter().map(Into::into).collect();
        self
    }
}

/// A protected resource and its protected actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Resource identifier (e.g., "App\\Controller\\Users")
    pub subject: String,

    /// Title of the resource-level role; `None` when only actions are protected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RoleOptions>,

    /// Default group for the resource and its actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Default presets for the resource and its actions
    #[serde(default)]
    pub presets: Vec<String>,

    #[serde(default)]
    pub actions: Vec<ActionDeclaration>,
}

impl ResourceDeclaration {
    /// Declare a resource without protecting it as a whole
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            title: None,
            options: None,
            group: None,
            presets: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Protect the resource as a whole under the given title
    pub fn protected(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_options(mut self, options: RoleOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_presets<I, S>(mut self, presets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets = presets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action(mut self, action: ActionDeclaration) -> Self {
        self.actions.push(action);
        self
    }

    /// Flatten the declaration into registry rules
    ///
    /// The resource rule (if any) comes first, then one rule per action in
    /// declaration order.
    pub fn into_rules(self) -> Vec<RoleRule> {
        let mut rules = Vec::with_capacity(self.actions.len() + 1);

        if let Some(title) = self.title {
            rules.push(RoleRule {
                subject_id: self.subject.clone(),
                action: None,
                title,
                options: self.options,
                group: self.group.clone(),
                presets: self.presets.clone(),
            });
        }

        for action in self.actions {
            let group = action.group.or_else(|| self.group.clone());
            let presets = if action.presets.is_empty() {
                self.presets.clone()
            } else {
                action.presets
            };

            rules.push(RoleRule {
                subject_id: self.subject.clone(),
                action: Some(action.name),
                title: action.title,
                options: action.options,
                group,
                presets,
            });
        }

        rules
    }
}
