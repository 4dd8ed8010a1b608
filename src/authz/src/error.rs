//! Error types for the access resolution engine

use thiserror::Error;

/// Access engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A registration was attempted after the registry was sealed
    #[error("Role registry is sealed; cannot register '{0}'")]
    RegistryFrozen(String),

    /// A hierarchy rule could not be compiled
    #[error("Invalid hierarchy rule for '{role}': {reason}")]
    InvalidHierarchyRule {
        /// Granting role of the offending rule
        role: String,
        /// Why the rule was rejected
        reason: String,
    },

    /// The hierarchy resolver was queried before it was built
    #[error("Role hierarchy has not been built")]
    NotBuilt,

    /// External cache failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Backing role source failure
    #[error("Role source error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Whether the error must abort startup rather than degrade
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuthzError::RegistryFrozen(_)
                | AuthzError::InvalidHierarchyRule { .. }
                | AuthzError::NotBuilt
                | AuthzError::Config(_)
        )
    }
}

/// Result type for access engine operations
pub type Result<T> = std::result::Result<T, AuthzError>;
