//! Error types for the link graph engine.
//!
//! Three classes, handled differently at the engine boundary:
//! - [`LinkError::Validation`]: user-facing validation failure, reported on the PR and
//!   never retried
//! - [`LinkError::Transient`]: infrastructure failure after retries ran out
//! - [`LinkError::Partial`]: some side effects landed and some did not

use linkpull_state::PullRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A not-ready pull request blocking a synchronized merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingPull {
    pub pull: PullRef,
    pub url: String,
    /// Required labels the PR is missing
    pub missing: Vec<String>,
    /// Set when the PR lifecycle itself blocks the merge (e.g. closed)
    pub state: Option<String>,
}

impl std::fmt::Display for BlockingPull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(state) = &self.state {
            write!(f, " ({state})")?;
        }
        if !self.missing.is_empty() {
            write!(f, " missing: {}", self.missing.join(", "))?;
        }
        Ok(())
    }
}

/// Validation failures of link operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("target PR not found: {url}")]
    TargetNotFound { url: String },

    #[error("target PR already merged: {url}")]
    TargetMerged { url: String },

    #[error("target PR closed: {url}")]
    TargetClosed { url: String },

    #[error("no dependency relationship between {source_package} and {url}")]
    NoDependency { source_package: String, url: String },

    #[error("source PR already linked to {contact_url}, please contact the maintainer of that repository")]
    AlreadyLinked { contact: PullRef, contact_url: String },

    #[error("source PR already belongs to another link tree through {contact_url}, please contact the maintainer of that repository")]
    SeparateLinkTree { contact: PullRef, contact_url: String },

    #[error("source and target PRs belong to the same repository: {url}")]
    SameRepository { url: String },

    #[error("a pull request cannot be linked to itself: {url}")]
    SelfLink { url: String },

    #[error("no linked pull requests for {url}")]
    NotLinked { url: String },

    #[error("linked PRs do not meet the merge requirements (lgtm, approved, openeuler-cla/yes), please contact the maintainers: {}", join_blocking(.blocking))]
    NotReady { blocking: Vec<BlockingPull> },
}

fn join_blocking(blocking: &[BlockingPull]) -> String {
    blocking
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced inside the link graph engine.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Validation failure; reported to the user, never retried.
    #[error(transparent)]
    Validation(#[from] Rejection),

    /// Store or host unreachable after bounded retries.
    #[error("{operation} failed: {detail}")]
    Transient { operation: String, detail: String },

    /// Some side effects were applied, others failed. No rollback is attempted.
    #[error("{completed}; {failed}")]
    Partial { completed: String, failed: String },
}

impl LinkError {
    /// Transient failure of a single, non-retried call.
    pub fn transient(operation: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        LinkError::Transient {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LinkError::Validation(_))
    }
}

/// Failures while wiring the engine from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Host(#[from] crate::host::HostError),

    #[error(transparent)]
    Oracle(#[from] crate::oracle::OracleError),
}

/// Convenience result alias.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages_name_the_reason() {
        let merged = Rejection::TargetMerged {
            url: "https://gitee.com/src-openeuler/zlib/pulls/3".into(),
        };
        assert!(merged.to_string().contains("already merged"));

        let missing = Rejection::TargetNotFound { url: "u".into() };
        assert!(missing.to_string().contains("target PR not found"));

        let dup = Rejection::AlreadyLinked {
            contact: PullRef::new("curl", 9),
            contact_url: "https://gitee.com/src-openeuler/curl/pulls/9".into(),
        };
        assert!(dup.to_string().contains("already linked"));
        assert!(dup.to_string().contains("curl/pulls/9"));
    }

    #[test]
    fn test_not_ready_lists_every_blocking_pull() {
        let rejection = Rejection::NotReady {
            blocking: vec![
                BlockingPull {
                    pull: PullRef::new("a", 1),
                    url: "url-a".into(),
                    missing: vec!["approved".into()],
                    state: None,
                },
                BlockingPull {
                    pull: PullRef::new("b", 2),
                    url: "url-b".into(),
                    missing: vec![],
                    state: Some("closed".into()),
                },
            ],
        };
        let msg = rejection.to_string();
        assert!(msg.contains("url-a missing: approved"));
        assert!(msg.contains("url-b (closed)"));
    }

    #[test]
    fn test_transient_error_display() {
        let err = LinkError::transient("insert link", "connection refused");
        assert_eq!(err.to_string(), "insert link failed: connection refused");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_rejection_serializes_with_reason_tag() {
        let json = serde_json::to_value(Rejection::TargetClosed { url: "u".into() }).unwrap();
        assert_eq!(json["reason"], "target_closed");
    }
}
