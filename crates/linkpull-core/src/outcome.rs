//! Structured results returned by engine operations.

use linkpull_state::PullRef;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected request; retrying the same call will not help.
    Validation,
    /// Infrastructure failure; the caller may retry the whole call.
    Transient,
    /// Some side effects were applied and others were not.
    Partial,
}

/// `{result, detail}` shape of every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub result: OutcomeStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Side effects that failed without failing the operation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// PRs released for merging.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_signal: Vec<PullRef>,
}

impl LinkOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            result: OutcomeStatus::Success,
            detail: detail.into(),
            failure: None,
            warnings: Vec::new(),
            merge_signal: Vec::new(),
        }
    }

    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            result: OutcomeStatus::Failed,
            detail: detail.into(),
            failure: Some(kind),
            warnings: Vec::new(),
            merge_signal: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_merge_signal(mut self, pulls: Vec<PullRef>) -> Self {
        self.merge_signal = pulls;
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == OutcomeStatus::Success
    }
}

impl From<&LinkError> for LinkOutcome {
    fn from(err: &LinkError) -> Self {
        let kind = match err {
            LinkError::Validation(_) => FailureKind::Validation,
            LinkError::Transient { .. } => FailureKind::Transient,
            LinkError::Partial { .. } => FailureKind::Partial,
        };
        LinkOutcome::failed(kind, err.to_string())
    }
}

/// One-hop neighbour of a PR with its live lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub repo: String,
    pub number: u64,
    pub url: String,
    /// `open`, `merged`, `closed`, or `unknown` when the host could not say.
    pub status: String,
}

/// Result of a relations query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationsReport {
    #[serde(flatten)]
    pub outcome: LinkOutcome,
    /// PRs this PR was linked to (it is the edge source).
    pub linked_by_me: Vec<Relation>,
    /// PRs that linked to this PR (it is the edge link).
    pub links_to_me: Vec<Relation>,
}

impl RelationsReport {
    pub fn failed(outcome: LinkOutcome) -> Self {
        Self {
            outcome,
            linked_by_me: Vec::new(),
            links_to_me: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;

    #[test]
    fn test_outcome_json_shape() {
        let json = serde_json::to_value(LinkOutcome::success("linked")).unwrap();
        assert_eq!(json, serde_json::json!({"result": "success", "detail": "linked"}));
    }

    #[test]
    fn test_error_maps_to_failure_kind() {
        let err = LinkError::Validation(Rejection::TargetMerged { url: "u".into() });
        let outcome = LinkOutcome::from(&err);
        assert_eq!(outcome.result, OutcomeStatus::Failed);
        assert_eq!(outcome.failure, Some(FailureKind::Validation));
        assert!(outcome.detail.contains("already merged"));

        let outcome = LinkOutcome::from(&LinkError::transient("read", "timeout"));
        assert_eq!(outcome.failure, Some(FailureKind::Transient));
    }

    #[test]
    fn test_relations_report_flattens_outcome() {
        let report = RelationsReport {
            outcome: LinkOutcome::success("1 relation(s)"),
            linked_by_me: vec![Relation {
                repo: "zlib".into(),
                number: 2,
                url: "u".into(),
                status: "open".into(),
            }],
            links_to_me: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["result"], "success");
        assert_eq!(json["linked_by_me"][0]["status"], "open");
        assert!(json["links_to_me"].as_array().unwrap().is_empty());
    }
}
