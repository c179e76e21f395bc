//! Merge readiness of pull requests and of whole link trees.

use std::collections::BTreeSet;

use linkpull_state::PullRef;
use serde::{Deserialize, Serialize};

use crate::error::BlockingPull;
use crate::host::PullState;

/// Label marking a PR as part of a link tree.
pub const LINKPULL_LABEL: &str = "linkpull";

/// Labels a PR must carry to be ready.
pub const REQUIRED_LABELS: [&str; 3] = ["lgtm", "approved", "openeuler-cla/yes"];

/// Readiness token cached on edges of a ready tree. A blocked tree caches `None`.
pub const MERGE_TOKEN: &str = "lgtm,approved,openeuler-cla/yes";

/// Readiness verdict for one node of a link tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReadiness {
    pub pull: PullRef,
    pub state: PullState,
    /// Required labels that are absent, in canonical order.
    pub missing: Vec<String>,
}

impl NodeReadiness {
    /// A merged PR is ready regardless of labels. A closed PR never is.
    pub fn assess(pull: &PullRef, state: PullState, labels: &[String]) -> Self {
        let present: BTreeSet<&str> = labels.iter().map(String::as_str).collect();
        let missing = match state {
            PullState::Merged => Vec::new(),
            PullState::Open | PullState::Closed => REQUIRED_LABELS
                .iter()
                .filter(|l| !present.contains(*l))
                .map(|l| l.to_string())
                .collect(),
        };
        Self {
            pull: pull.clone(),
            state,
            missing,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state != PullState::Closed && self.missing.is_empty()
    }

    pub fn blocking(&self, url: String) -> BlockingPull {
        BlockingPull {
            pull: self.pull.clone(),
            url,
            missing: self.missing.clone(),
            state: (self.state == PullState::Closed).then(|| self.state.to_string()),
        }
    }
}

/// Tag cached for every node of a tree: the token only when all nodes are ready.
pub fn tree_token(verdicts: &[NodeReadiness]) -> Option<&'static str> {
    verdicts.iter().all(NodeReadiness::is_ready).then_some(MERGE_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_labels_present_is_ready() {
        let r = NodeReadiness::assess(
            &PullRef::new("a", 1),
            PullState::Open,
            &labels(&["openeuler-cla/yes", "approved", "lgtm", "linkpull"]),
        );
        assert!(r.is_ready());
    }

    #[test]
    fn test_missing_labels_reported_in_order() {
        let r = NodeReadiness::assess(&PullRef::new("a", 1), PullState::Open, &labels(&["approved"]));
        assert!(!r.is_ready());
        assert_eq!(r.missing, vec!["lgtm", "openeuler-cla/yes"]);
    }

    #[test]
    fn test_merged_is_ready_without_labels() {
        let r = NodeReadiness::assess(&PullRef::new("a", 1), PullState::Merged, &[]);
        assert!(r.is_ready());
    }

    #[test]
    fn test_closed_is_never_ready() {
        let r = NodeReadiness::assess(
            &PullRef::new("a", 1),
            PullState::Closed,
            &labels(&REQUIRED_LABELS),
        );
        assert!(!r.is_ready());
        assert_eq!(r.blocking("u".into()).state.as_deref(), Some("closed"));
    }

    #[test]
    fn test_tree_token_requires_every_node_ready() {
        let ready = NodeReadiness::assess(&PullRef::new("a", 1), PullState::Open, &labels(&REQUIRED_LABELS));
        let merged = NodeReadiness::assess(&PullRef::new("b", 1), PullState::Merged, &[]);
        let blocked = NodeReadiness::assess(&PullRef::new("c", 1), PullState::Open, &labels(&["lgtm"]));

        assert_eq!(tree_token(&[ready.clone(), merged.clone()]), Some(MERGE_TOKEN));
        assert_eq!(tree_token(&[ready, merged, blocked]), None);
    }
}
