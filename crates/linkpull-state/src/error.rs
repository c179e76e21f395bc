//! Error types for linkpull-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the relation store
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by [`crate::LinkStore`] operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not complete the statement (unreachable, timeout,
    /// constraint race). Callers may retry.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A pull reference that cannot be stored (empty repo, zero number)
    #[error("invalid pull reference: {pull}")]
    InvalidPull { pull: String },

    /// An edge from a pull request to itself
    #[error("refusing to store self-link on {pull}")]
    SelfLink { pull: String },
}

impl StorageError {
    /// Whether repeating the same statement may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_transient() {
        assert!(StorageError::Backend("timeout".into()).is_transient());
        assert!(!StorageError::SelfLink {
            pull: "zlib#1".into()
        }
        .is_transient());
    }
}
