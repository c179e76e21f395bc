//! In-memory [`RepoHost`] for tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use linkpull_state::PullRef;

use super::{HostError, HostResult, PullInfo, PullState, RepoHost};
use crate::pull::pull_url;

/// A comment recorded by [`MemoryRepoHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedComment {
    pub id: u64,
    pub pull: PullRef,
    pub body: String,
}

#[derive(Debug, Clone)]
struct FakePull {
    state: PullState,
    labels: BTreeSet<String>,
}

/// Fake code host keeping PRs, labels and comments in memory.
#[derive(Debug, Default)]
pub struct MemoryRepoHost {
    pulls: Mutex<BTreeMap<PullRef, FakePull>>,
    comments: Mutex<Vec<RecordedComment>>,
    next_comment: AtomicU64,
    label_pages: AtomicU32,
    /// PRs whose reads fail with a transport error
    unreachable: Mutex<HashSet<PullRef>>,
    /// PRs whose label removal is rejected
    sticky_labels: Mutex<HashSet<PullRef>>,
    failing_comments: AtomicU32,
}

impl MemoryRepoHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pull(&self, pull: &PullRef, state: PullState, labels: &[&str]) {
        self.pulls.lock().unwrap().insert(
            pull.clone(),
            FakePull {
                state,
                labels: labels.iter().map(|l| l.to_string()).collect(),
            },
        );
    }

    pub fn set_state(&self, pull: &PullRef, state: PullState) {
        if let Some(p) = self.pulls.lock().unwrap().get_mut(pull) {
            p.state = state;
        }
    }

    pub fn set_labels(&self, pull: &PullRef, labels: &[&str]) {
        if let Some(p) = self.pulls.lock().unwrap().get_mut(pull) {
            p.labels = labels.iter().map(|l| l.to_string()).collect();
        }
    }

    pub fn labels_of(&self, pull: &PullRef) -> BTreeSet<String> {
        self.pulls
            .lock()
            .unwrap()
            .get(pull)
            .map(|p| p.labels.clone())
            .unwrap_or_default()
    }

    pub fn has_label(&self, pull: &PullRef, label: &str) -> bool {
        self.labels_of(pull).contains(label)
    }

    /// Reads and writes for `pull` fail with a transport error.
    pub fn make_unreachable(&self, pull: &PullRef) {
        self.unreachable.lock().unwrap().insert(pull.clone());
    }

    /// Label removal on `pull` is refused with HTTP 403.
    pub fn refuse_label_removal(&self, pull: &PullRef) {
        self.sticky_labels.lock().unwrap().insert(pull.clone());
    }

    /// The next `n` comment posts fail.
    pub fn fail_next_comments(&self, n: u32) {
        self.failing_comments.store(n, Ordering::SeqCst);
    }

    pub fn comments(&self) -> Vec<RecordedComment> {
        self.comments.lock().unwrap().clone()
    }

    pub fn comments_on(&self, pull: &PullRef) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| &c.pull == pull)
            .map(|c| c.body.clone())
            .collect()
    }

    pub fn label_pages_served(&self) -> u32 {
        self.label_pages.load(Ordering::SeqCst)
    }

    fn check_reachable(&self, pull: &PullRef) -> HostResult<()> {
        if self.unreachable.lock().unwrap().contains(pull) {
            return Err(HostError::Transport(format!("connection reset for {pull}")));
        }
        Ok(())
    }

    fn not_found(pull: &PullRef) -> HostError {
        HostError::NotFound(format!("/{}/pulls/{}", pull.repo, pull.number))
    }
}

#[async_trait]
impl RepoHost for MemoryRepoHost {
    async fn get_pull(&self, pull: &PullRef) -> HostResult<PullInfo> {
        self.check_reachable(pull)?;
        let pulls = self.pulls.lock().unwrap();
        let fake = pulls.get(pull).ok_or_else(|| Self::not_found(pull))?;
        Ok(PullInfo {
            pull: pull.clone(),
            state: fake.state,
            title: format!("{} pull request {}", pull.repo, pull.number),
            labels: fake.labels.iter().cloned().collect(),
            created_at: None,
        })
    }

    async fn add_label(&self, pull: &PullRef, label: &str) -> HostResult<()> {
        self.check_reachable(pull)?;
        let mut pulls = self.pulls.lock().unwrap();
        let fake = pulls.get_mut(pull).ok_or_else(|| Self::not_found(pull))?;
        fake.labels.insert(label.to_string());
        Ok(())
    }

    async fn remove_label(&self, pull: &PullRef, label: &str) -> HostResult<()> {
        self.check_reachable(pull)?;
        if self.sticky_labels.lock().unwrap().contains(pull) {
            return Err(HostError::Status {
                status: 403,
                body: "label removal forbidden".into(),
            });
        }
        let mut pulls = self.pulls.lock().unwrap();
        let fake = pulls.get_mut(pull).ok_or_else(|| Self::not_found(pull))?;
        if !fake.labels.remove(label) {
            return Err(HostError::NotFound(format!("label {label} on {pull}")));
        }
        Ok(())
    }

    async fn list_labels(&self, pull: &PullRef, page: u32, per_page: u32) -> HostResult<Vec<String>> {
        self.check_reachable(pull)?;
        self.label_pages.fetch_add(1, Ordering::SeqCst);
        let pulls = self.pulls.lock().unwrap();
        let fake = pulls.get(pull).ok_or_else(|| Self::not_found(pull))?;
        let skip = (page.saturating_sub(1) * per_page) as usize;
        Ok(fake
            .labels
            .iter()
            .skip(skip)
            .take(per_page as usize)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, pull: &PullRef, body: &str) -> HostResult<u64> {
        self.check_reachable(pull)?;
        let should_fail = self
            .failing_comments
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(HostError::Status {
                status: 503,
                body: "injected comment failure".into(),
            });
        }
        let id = self.next_comment.fetch_add(1, Ordering::SeqCst) + 1;
        self.comments.lock().unwrap().push(RecordedComment {
            id,
            pull: pull.clone(),
            body: body.to_string(),
        });
        Ok(id)
    }

    async fn edit_comment(&self, repo: &str, comment_id: u64, body: &str) -> HostResult<()> {
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .iter_mut()
            .find(|c| c.id == comment_id && c.pull.repo == repo)
            .ok_or_else(|| HostError::NotFound(format!("comment {comment_id} in {repo}")))?;
        comment.body = body.to_string();
        Ok(())
    }

    fn pull_url(&self, pull: &PullRef) -> String {
        pull_url(crate::config::DEFAULT_WEB_BASE, crate::config::DEFAULT_OWNER, pull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_labels_roundtrip() {
        let host = MemoryRepoHost::new();
        let pull = PullRef::new("zlib", 1);
        host.add_pull(&pull, PullState::Open, &["lgtm"]);

        host.add_label(&pull, "linkpull").await.unwrap();
        assert!(host.has_label(&pull, "linkpull"));
        host.remove_label(&pull, "linkpull").await.unwrap();
        assert!(!host.has_label(&pull, "linkpull"));
        assert!(host.remove_label(&pull, "linkpull").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_missing_pull_is_not_found() {
        let host = MemoryRepoHost::new();
        let err = host.get_pull(&PullRef::new("nope", 1)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_edit_comment_rewrites_body() {
        let host = MemoryRepoHost::new();
        let pull = PullRef::new("zlib", 1);
        host.add_pull(&pull, PullState::Open, &[]);
        let id = host.create_comment(&pull, "first").await.unwrap();
        host.edit_comment("zlib", id, "second").await.unwrap();
        assert_eq!(host.comments_on(&pull), vec!["second".to_string()]);
        assert!(host.edit_comment("other", id, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_injected_comment_failure() {
        let host = MemoryRepoHost::new();
        let pull = PullRef::new("zlib", 1);
        host.add_pull(&pull, PullState::Open, &[]);
        host.fail_next_comments(1);
        assert!(host.create_comment(&pull, "lost").await.is_err());
        assert!(host.create_comment(&pull, "kept").await.is_ok());
        assert_eq!(host.comments_on(&pull), vec!["kept".to_string()]);
    }
}
