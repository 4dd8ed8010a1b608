//! # Rolevote Access Engine
//!
//! Role-based access resolution for protected resources.
//!
//! ## Features
//!
//! - **Deterministic role names** derived from resource paths and actions
//! - **Write-once role registry** sealed before serving
//! - **Role hierarchy** with explicit lists and wildcard patterns, memoized per role set
//! - **Grant/deny/abstain voter** for prefixed permission attributes
//! - **TTL caching** of role data in front of any role source
//!
//! ## Example
//!
//! ```rust
//! use rolevote_authz::{
//!     Attribute, CachingRoleStore, HierarchyResolver, HierarchyRuleSource, RegistryRoleSource,
//!     ResourceDeclaration, ActionDeclaration, RoleRegistry, Vote, Voter,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = RoleRegistry::new();
//!     registry.register_declarations([ResourceDeclaration::new("app::Articles")
//!         .protected("Articles")
//!         .with_action(ActionDeclaration::new("edit", "Edit articles"))])?;
//!
//!     let source = RegistryRoleSource::new(
//!         Arc::new(registry),
//!         vec![HierarchyRuleSource::pattern("ROLE_ADMIN", "/^EAB_/")],
//!     );
//!     let store = CachingRoleStore::new(Arc::new(source));
//!
//!     let resolver = Arc::new(HierarchyResolver::new());
//!     resolver.build_from_source(&store).await?;
//!
//!     let voter = Voter::new(resolver);
//!     let vote = voter.vote(&["ROLE_ADMIN"], &[Attribute::from("EAB_appArticles_edit")]);
//!     assert_eq!(vote, Vote::Grant);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod declaration;
pub mod error;
pub mod formatter;
pub mod hierarchy;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod types;
pub mod voter;

// Re-export commonly used types
pub use cache::{CacheSettings, CachedValue, CachingRoleStore, InMemoryTtlCache, StoreStats, TtlCache};
pub use catalog::{AccessCatalog, CatalogGroup, GroupDescriptor, PresetDescriptor, RoleCatalogView};
pub use config::AccessConfig;
pub use declaration::{ActionDeclaration, ResourceDeclaration};
pub use error::{AuthzError, Result};
pub use formatter::{RoleNameFormatter, DEFAULT_ROLE_PREFIX};
pub use hierarchy::{
    Expansion, HierarchyResolver, HierarchyRule, HierarchyRuleSource, MemoPolicy, MemoStats, ReachableRoles,
};
pub use reconcile::ReconcilePlan;
pub use registry::RoleRegistry;
pub use store::{RegistryRoleSource, RoleFilter, RoleSource};
pub use types::{RoleDescriptor, RoleMap, RoleName, RoleOptions, RoleRule};
pub use voter::{Attribute, Vote, Voter, VoterConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
