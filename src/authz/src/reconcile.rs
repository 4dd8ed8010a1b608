//! Diff between declared roles and persisted role rows

use crate::types::{RoleDescriptor, RoleMap};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// Changes that bring persisted roles in line with the declared ones
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcilePlan {
    /// Persisted names that are no longer declared, sorted
    pub to_remove: Vec<String>,
    /// Declared roles that are not persisted yet, sorted by name
    pub to_insert: Vec<RoleDescriptor>,
}

impl ReconcilePlan {
    /// Compute the plan for `declared` against what is already persisted
    pub fn compute<I, S>(declared: &RoleMap, persisted_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let persisted: BTreeSet<String> = persisted_names.into_iter().map(Into::into).collect();

        let to_remove: Vec<String> = persisted
            .iter()
            .filter(|name| !declared.contains_key(name.as_str()))
            .cloned()
            .collect();

        let to_insert: Vec<RoleDescriptor> = declared
            .values()
            .filter(|role| !persisted.contains(&role.name))
            .cloned()
            .collect();

        info!(
            declared = declared.len(),
            persisted = persisted.len(),
            remove = to_remove.len(),
            insert = to_insert.len(),
            "Role reconciliation planned"
        );

        Self { to_remove, to_insert }
    }

    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_insert.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RoleRegistry;
    use crate::types::RoleRule;

    fn declared() -> RoleMap {
        let mut registry = RoleRegistry::new();
        registry
            .register_all(vec![
                RoleRule::new("Users", "Users"),
                RoleRule::new("Orders", "Orders"),
                RoleRule::new("Orders", "Cancel orders").with_action("cancel"),
            ])
            .unwrap();
        registry.all().clone()
    }

    #[test]
    fn test_plan() {
        let plan = ReconcilePlan::compute(&declared(), ["EAB_Users", "EAB_Legacy", "EAB_Archive"]);

        assert_eq!(plan.to_remove, vec!["EAB_Archive", "EAB_Legacy"]);
        let inserted: Vec<_> = plan.to_insert.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(inserted, vec!["EAB_Orders", "EAB_Orders_cancel"]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_plan_in_sync() {
        let declared = declared();
        let plan = ReconcilePlan::compute(&declared, declared.keys().cloned());

        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_empty_store() {
        let plan = ReconcilePlan::compute(&declared(), Vec::<String>::new());

        assert!(plan.to_remove.is_empty());
        assert_eq!(plan.to_insert.len(), 3);
    }

    #[test]
    fn test_plan_nothing_declared() {
        let plan = ReconcilePlan::compute(&RoleMap::new(), ["EAB_B", "EAB_A", "EAB_A"]);

        assert_eq!(plan.to_remove, vec!["EAB_A", "EAB_B"]);
        assert!(plan.to_insert.is_empty());
    }
}
