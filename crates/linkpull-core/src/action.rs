//! The closed set of link actions and their dispatch.

use linkpull_state::PullRef;
use serde::{Deserialize, Serialize};

use crate::engine::LinkEngine;
use crate::outcome::{LinkOutcome, RelationsReport};

/// One request to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LinkAction {
    /// Link `source` to `target`.
    Link { source: PullRef, target: PullRef },
    /// List one-hop relations.
    Verify { pull: PullRef },
    /// Drop every edge of a PR.
    Delete { pull: PullRef },
    /// Re-evaluate readiness and merge when the whole tree is ready.
    Sync { pull: PullRef },
    /// Release the tree regardless of readiness.
    Force { pull: PullRef },
}

impl LinkAction {
    pub fn name(&self) -> &'static str {
        match self {
            LinkAction::Link { .. } => "link",
            LinkAction::Verify { .. } => "verify",
            LinkAction::Delete { .. } => "delete",
            LinkAction::Sync { .. } => "sync",
            LinkAction::Force { .. } => "force",
        }
    }

    /// The PR the action was requested on.
    pub fn pull(&self) -> &PullRef {
        match self {
            LinkAction::Link { source, .. } => source,
            LinkAction::Verify { pull }
            | LinkAction::Delete { pull }
            | LinkAction::Sync { pull }
            | LinkAction::Force { pull } => pull,
        }
    }
}

/// Result of [`LinkEngine::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionReport {
    Relations(RelationsReport),
    Outcome(LinkOutcome),
}

impl ActionReport {
    pub fn outcome(&self) -> &LinkOutcome {
        match self {
            ActionReport::Outcome(outcome) => outcome,
            ActionReport::Relations(report) => &report.outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome().is_success()
    }
}

impl LinkEngine {
    pub async fn dispatch(&self, action: &LinkAction) -> ActionReport {
        tracing::debug!(action = action.name(), pull = %action.pull(), "dispatching");
        match action {
            LinkAction::Link { source, target } => {
                ActionReport::Outcome(self.create_link(source, target).await)
            }
            LinkAction::Verify { pull } => ActionReport::Relations(self.relations_of(pull).await),
            LinkAction::Delete { pull } => ActionReport::Outcome(self.delete_link(pull).await),
            LinkAction::Sync { pull } => ActionReport::Outcome(self.evaluate_and_merge(pull).await),
            LinkAction::Force { pull } => ActionReport::Outcome(self.force_merge(pull).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use linkpull_state::fakes::MemoryLinkStore;

    use crate::host::fakes::MemoryRepoHost;
    use crate::host::PullState;
    use crate::manifest::RepoNameResolver;
    use crate::oracle::StaticDependencyOracle;
    use crate::retry::RetryPolicy;

    fn engine(host: Arc<MemoryRepoHost>) -> LinkEngine {
        LinkEngine::new(
            Arc::new(MemoryLinkStore::new()),
            host,
            Arc::new(StaticDependencyOracle::new().with("zlib", &["curl"], &[])),
            Arc::new(RepoNameResolver),
        )
        .with_retry(RetryPolicy::no_retry())
    }

    #[test]
    fn test_action_serializes_with_tag() {
        let action = LinkAction::Sync {
            pull: PullRef::new("zlib", 1),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "sync");
        assert_eq!(json["pull"]["repo"], "zlib");
        assert_eq!(action.name(), "sync");
    }

    #[tokio::test]
    async fn test_dispatch_routes_link_and_verify() {
        let host = Arc::new(MemoryRepoHost::new());
        let zlib = PullRef::new("zlib", 1);
        let curl = PullRef::new("curl", 2);
        host.add_pull(&zlib, PullState::Open, &[]);
        host.add_pull(&curl, PullState::Open, &[]);
        let engine = engine(host);

        let report = engine
            .dispatch(&LinkAction::Link {
                source: zlib.clone(),
                target: curl.clone(),
            })
            .await;
        assert!(report.is_success(), "{report:?}");

        match engine.dispatch(&LinkAction::Verify { pull: zlib }).await {
            ActionReport::Relations(r) => {
                assert_eq!(r.linked_by_me.len(), 1);
                assert_eq!(r.linked_by_me[0].repo, "curl");
            }
            other => panic!("expected relations, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_sync_on_unlinked_pull_fails() {
        let host = Arc::new(MemoryRepoHost::new());
        let pull = PullRef::new("zlib", 9);
        host.add_pull(&pull, PullState::Open, &[]);
        let report = engine(host).dispatch(&LinkAction::Sync { pull }).await;
        assert!(!report.is_success());
        assert!(report.outcome().detail.contains("no linked pull requests"));
    }
}
