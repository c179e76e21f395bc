//! Storage trait definitions for the link relation store
//!
//! The relation is logically undirected: an edge `(A,1) -> (B,2)` is the same
//! fact as `(B,2) -> (A,1)`, and every lookup matches both endpoints.
//!
//! All operations are single round trips; there is no cross-statement
//! locking, so callers must tolerate concurrent writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::{LinkEdgeRecord, PullRef};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A stored link between two pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEdge {
    /// The PR the link was requested from
    pub source: PullRef,
    /// The PR the source was linked to
    pub link: PullRef,
    /// Cached readiness token for `source`
    pub source_pr_tag: Option<String>,
    /// Cached readiness token for `link`
    pub link_pr_tag: Option<String>,
    pub link_date: DateTime<Utc>,
}

impl LinkEdge {
    /// Whether either endpoint is `pull`.
    pub fn touches(&self, pull: &PullRef) -> bool {
        self.source == *pull || self.link == *pull
    }

    /// The opposite endpoint, if `pull` is on this edge.
    pub fn peer_of(&self, pull: &PullRef) -> Option<&PullRef> {
        if self.source == *pull {
            Some(&self.link)
        } else if self.link == *pull {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Cached tag for the endpoint `pull` (`None` if not on this edge or unset).
    pub fn tag_of(&self, pull: &PullRef) -> Option<&str> {
        if self.source == *pull {
            self.source_pr_tag.as_deref()
        } else if self.link == *pull {
            self.link_pr_tag.as_deref()
        } else {
            None
        }
    }

    /// Same fact regardless of direction.
    pub fn connects(&self, a: &PullRef, b: &PullRef) -> bool {
        (self.source == *a && self.link == *b) || (self.source == *b && self.link == *a)
    }
}

impl From<LinkEdgeRecord> for LinkEdge {
    fn from(row: LinkEdgeRecord) -> Self {
        LinkEdge {
            source: row.source(),
            link: row.link(),
            source_pr_tag: row.source_pr_tag,
            link_pr_tag: row.link_pr_tag,
            link_date: row.link_date,
        }
    }
}

/// Durable table of link edges.
///
/// Guarantees:
/// - `insert_link` is idempotent: an edge equal to an existing one in either
///   direction returns the stored edge instead of creating a second row.
/// - `edges_touching` answers for a whole set of nodes in one round trip.
/// - `delete_links` and `update_tag` match both endpoint columns.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Insert the edge `source <-> link`, returning the stored edge.
    async fn insert_link(&self, source: &PullRef, link: &PullRef) -> StorageResult<LinkEdge>;

    /// All edges with at least one endpoint in `pulls`.
    async fn edges_touching(&self, pulls: &[PullRef]) -> StorageResult<Vec<LinkEdge>>;

    /// Remove every edge touching `pull`. Returns the number of rows removed.
    async fn delete_links(&self, pull: &PullRef) -> StorageResult<usize>;

    /// Write `tag` onto every endpoint that references `pull`.
    /// Returns the number of endpoints updated.
    async fn update_tag(&self, pull: &PullRef, tag: Option<&str>) -> StorageResult<usize>;
}

/// Shared argument checks for store implementations.
pub(crate) fn check_new_link(source: &PullRef, link: &PullRef) -> StorageResult<()> {
    source.validate()?;
    link.validate()?;
    if source == link {
        return Err(StorageError::SelfLink {
            pull: source.key(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &PullRef, b: &PullRef) -> LinkEdge {
        LinkEdge::from(LinkEdgeRecord::new(a, b))
    }

    #[test]
    fn test_peer_of_is_symmetric() {
        let a = PullRef::new("a", 1);
        let b = PullRef::new("b", 2);
        let e = edge(&a, &b);
        assert_eq!(e.peer_of(&a), Some(&b));
        assert_eq!(e.peer_of(&b), Some(&a));
        assert_eq!(e.peer_of(&PullRef::new("c", 3)), None);
    }

    #[test]
    fn test_connects_ignores_direction() {
        let a = PullRef::new("a", 1);
        let b = PullRef::new("b", 2);
        let e = edge(&a, &b);
        assert!(e.connects(&a, &b));
        assert!(e.connects(&b, &a));
        assert!(!e.connects(&a, &PullRef::new("b", 3)));
    }

    #[test]
    fn test_tag_of_reads_matching_side() {
        let a = PullRef::new("a", 1);
        let b = PullRef::new("b", 2);
        let mut e = edge(&a, &b);
        e.link_pr_tag = Some("ready".into());
        assert_eq!(e.tag_of(&b), Some("ready"));
        assert_eq!(e.tag_of(&a), None);
    }

    #[test]
    fn test_self_link_rejected() {
        let a = PullRef::new("a", 1);
        assert!(matches!(
            check_new_link(&a, &a),
            Err(StorageError::SelfLink { .. })
        ));
    }
}
