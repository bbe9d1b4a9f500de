//! Error types for graph engine operations.

use nodegraph_key::KeyError;
use thiserror::Error;

/// The kind of resource a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A node in the registry.
    Node,
    /// A dependency edge.
    Dependency,
    /// An event subscription.
    Subscription,
    /// A recorded node event.
    Event,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Dependency => write!(f, "dependency"),
            Self::Subscription => write!(f, "subscription"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// The error type for graph engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The referenced node, edge, subscription or event does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of resource was looked up.
        kind: ResourceKind,
        /// The id or key that was looked up.
        id: String,
    },

    /// The edge would close a cycle in the active graph.
    #[error("circular dependency: {dependent} -> {dependency} would close a cycle")]
    CircularDependency {
        /// Key of the node that would depend on `dependency`.
        dependent: String,
        /// Key of the node being depended upon.
        dependency: String,
    },

    /// A composite key failed to encode or decode.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// A store constraint was violated (e.g. duplicate active edge).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A cascade could not complete; every step was rolled back.
    #[error("cascade from node {node} failed: {source}")]
    CascadeFailure {
        /// Key of the node the cascade started from.
        node: String,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },

    /// Input was rejected (unknown type name, malformed filter, bad range).
    #[error("validation error: {0}")]
    Validation(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant broken (poisoned lock, corrupt row).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Wrap `self` as the cause of a failed cascade from `node`.
    #[must_use]
    pub fn into_cascade_failure(self, node: impl ToString) -> Self {
        match self {
            // Already wrapped by an inner step; keep the outermost node.
            Self::CascadeFailure { .. } => self,
            other => Self::CascadeFailure {
                node: node.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` if this error means the input was wrong rather than
    /// the store failing.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::CircularDependency { .. }
                | Self::InvalidKey(_)
                | Self::ConstraintViolation(_)
                | Self::Validation(_)
        )
    }
}

/// A specialized Result type for graph engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_kind() {
        let err = Error::not_found(ResourceKind::Dependency, 12);
        assert_eq!(err.to_string(), "dependency not found: 12");
        assert!(err.is_client_error());
    }

    #[test]
    fn cascade_failure_is_not_double_wrapped() {
        let inner = Error::Internal("boom".to_string()).into_cascade_failure("url-db:docs:2");
        let outer = inner.into_cascade_failure("url-db:docs:1");

        match outer {
            Error::CascadeFailure { node, source } => {
                assert_eq!(node, "url-db:docs:2");
                assert!(matches!(*source, Error::Internal(_)));
            }
            other => panic!("expected CascadeFailure, got {other:?}"),
        }
    }

    #[test]
    fn database_errors_are_server_side() {
        let err = Error::from(rusqlite::Error::InvalidQuery);
        assert!(!err.is_client_error());
    }
}
