//! Canonical role names for protected resources
//!
//! A protected resource (a controller type, a handler module, ...) is
//! identified by a namespaced path. Its role name is the fixed prefix followed
//! by the path with namespace separators removed, plus `_<action>` when the
//! role protects a single action of the resource:
//!
//! ```
//! use rolevote_authz::RoleNameFormatter;
//!
//! let formatter = RoleNameFormatter::default();
//! assert_eq!(formatter.format("App\\Controller\\Users", None), "EAB_AppControllerUsers");
//! assert_eq!(formatter.format("app::users", Some("delete")), "EAB_appusers_delete");
//! ```

/// Prefix carried by every role this engine issues
pub const DEFAULT_ROLE_PREFIX: &str = "EAB_";

/// Namespace separators stripped from subject identifiers
const SEPARATORS: [&str; 3] = ["::", "\\", "/"];

/// Deterministic role-name formatter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleNameFormatter {
    prefix: String,
}

impl RoleNameFormatter {
    /// Formatter with a custom role prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The prefix every formatted name starts with
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Format a subject identifier (and optional action) into a role name
    ///
    /// Never fails. An empty subject yields the bare prefix.
    pub fn format(&self, subject_id: &str, action: Option<&str>) -> String {
        let mut subject = subject_id.to_string();
        for separator in SEPARATORS {
            subject = subject.replace(separator, "");
        }

        let mut role = String::with_capacity(self.prefix.len() + subject.len() + 16);
        role.push_str(&self.prefix);
        role.push_str(&subject);

        if let Some(action) = action {
            role.push('_');
            role.push_str(action);
        }

        role
    }
}

impl Default for RoleNameFormatter {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_ROLE_PREFIX)
    }
}
