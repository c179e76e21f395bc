//! Code-hosting platform adapter.
//!
//! The engine talks to the platform only through [`RepoHost`]. The
//! production implementation is [`gitee::GiteeClient`]; tests use
//! [`fakes::MemoryRepoHost`].

pub mod fakes;
pub mod gitee;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkpull_state::PullRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::Retryable;

/// Page size used when listing labels.
pub const LABEL_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum HostError {
    /// The resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("host returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("host client misconfigured: {0}")]
    Config(String),
}

impl HostError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound(_))
    }
}

impl Retryable for HostError {
    fn is_transient(&self) -> bool {
        match self {
            HostError::Transport(_) => true,
            HostError::Status { status, .. } => *status >= 500 || *status == 429,
            HostError::NotFound(_) | HostError::Decode(_) | HostError::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for HostError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            HostError::Decode(e.to_string())
        } else {
            HostError::Transport(e.to_string())
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullState {
    Open,
    Merged,
    Closed,
}

impl PullState {
    /// Map the platform's state string. Unknown values are treated as open.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "merged" => PullState::Merged,
            "closed" | "close" => PullState::Closed,
            _ => PullState::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PullState::Open => "open",
            PullState::Merged => "merged",
            PullState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PullState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull request metadata as returned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullInfo {
    pub pull: PullRef,
    pub state: PullState,
    pub title: String,
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Remote operations on pull requests.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Fetch a pull request. A missing PR is [`HostError::NotFound`].
    async fn get_pull(&self, pull: &PullRef) -> HostResult<PullInfo>;

    async fn add_label(&self, pull: &PullRef, label: &str) -> HostResult<()>;

    async fn remove_label(&self, pull: &PullRef, label: &str) -> HostResult<()>;

    /// One page of label names, 1-based.
    async fn list_labels(&self, pull: &PullRef, page: u32, per_page: u32) -> HostResult<Vec<String>>;

    /// Post a comment and return its id.
    async fn create_comment(&self, pull: &PullRef, body: &str) -> HostResult<u64>;

    async fn edit_comment(&self, repo: &str, comment_id: u64, body: &str) -> HostResult<()>;

    /// Web URL of a pull request.
    fn pull_url(&self, pull: &PullRef) -> String;
}

/// Every label on a pull request, following pagination until a short page.
pub async fn all_labels(host: &dyn RepoHost, pull: &PullRef) -> HostResult<Vec<String>> {
    let mut labels = Vec::new();
    let mut page = 1;
    loop {
        let batch = host.list_labels(pull, page, LABEL_PAGE_SIZE).await?;
        let short = (batch.len() as u32) < LABEL_PAGE_SIZE;
        labels.extend(batch);
        if short {
            return Ok(labels);
        }
        page += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::MemoryRepoHost;
    use super::*;

    #[test]
    fn test_pull_state_parse() {
        assert_eq!(PullState::parse("merged"), PullState::Merged);
        assert_eq!(PullState::parse("close"), PullState::Closed);
        assert_eq!(PullState::parse("CLOSED"), PullState::Closed);
        assert_eq!(PullState::parse("open"), PullState::Open);
    }

    #[test]
    fn test_retryability() {
        assert!(HostError::Transport("reset".into()).is_transient());
        assert!(HostError::Status {
            status: 502,
            body: String::new()
        }
        .is_transient());
        assert!(!HostError::Status {
            status: 403,
            body: String::new()
        }
        .is_transient());
        assert!(!HostError::NotFound("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_all_labels_follows_pages() {
        let host = MemoryRepoHost::new();
        let pull = PullRef::new("big", 1);
        let many: Vec<String> = (0..230).map(|i| format!("label-{i}")).collect();
        host.add_pull(&pull, PullState::Open, &many.iter().map(String::as_str).collect::<Vec<_>>());

        let labels = all_labels(&host, &pull).await.unwrap();
        assert_eq!(labels.len(), 230);
        assert_eq!(host.label_pages_served(), 3);
    }
}
