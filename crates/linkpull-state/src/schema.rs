//! Relation store schema: pull references and `link_pull` rows
//!
//! A row records one undirected link between two pull requests. The
//! `source_*` side is the PR the link was requested from, the `link_*`
//! side is its target; lookups always match both sides.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// A pull request identity: repository name plus repo-scoped number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PullRef {
    pub repo: String,
    pub number: u64,
}

impl PullRef {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }

    /// Stable lookup key stored alongside each endpoint (`repo#number`).
    pub fn key(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }

    /// Reject references that could never name a real pull request.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.repo.trim().is_empty() || self.number == 0 {
            return Err(StorageError::InvalidPull {
                pull: self.key(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for PullRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// `link_pull` row as persisted in SurrealDB.
///
/// `source_key` / `link_key` duplicate the `(repo, pr)` pairs so that a
/// whole traversal frontier can be matched with one `INSIDE` query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEdgeRecord {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub source_repo: String,
    pub source_pr: u64,
    pub source_key: String,
    pub link_repo: String,
    pub link_pr: u64,
    pub link_key: String,
    /// Last readiness token computed for the source side
    #[serde(default)]
    pub source_pr_tag: Option<String>,
    /// Last readiness token computed for the link side
    #[serde(default)]
    pub link_pr_tag: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub link_date: DateTime<Utc>,
}

impl LinkEdgeRecord {
    /// Create a fresh row with no cached readiness.
    pub fn new(source: &PullRef, link: &PullRef) -> Self {
        LinkEdgeRecord {
            id: None,
            source_repo: source.repo.clone(),
            source_pr: source.number,
            source_key: source.key(),
            link_repo: link.repo.clone(),
            link_pr: link.number,
            link_key: link.key(),
            source_pr_tag: None,
            link_pr_tag: None,
            link_date: Utc::now(),
        }
    }

    pub fn source(&self) -> PullRef {
        PullRef::new(self.source_repo.clone(), self.source_pr)
    }

    pub fn link(&self) -> PullRef {
        PullRef::new(self.link_repo.clone(), self.link_pr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_ref_key_and_display_agree() {
        let pull = PullRef::new("python-requests", 42);
        assert_eq!(pull.key(), "python-requests#42");
        assert_eq!(pull.to_string(), pull.key());
    }

    #[test]
    fn test_pull_ref_validation() {
        assert!(PullRef::new("zlib", 1).validate().is_ok());
        assert!(matches!(
            PullRef::new("zlib", 0).validate(),
            Err(StorageError::InvalidPull { .. })
        ));
        assert!(PullRef::new("  ", 3).validate().is_err());
    }

    #[test]
    fn test_record_serialization_carries_keys() {
        let row = LinkEdgeRecord::new(&PullRef::new("a", 1), &PullRef::new("b", 2));
        let json = serde_json::to_value(&row).expect("serialize");
        assert_eq!(json["source_key"], "a#1");
        assert_eq!(json["link_key"], "b#2");
        assert!(json.get("id").is_none());
        assert!(json["source_pr_tag"].is_null());
    }
}
