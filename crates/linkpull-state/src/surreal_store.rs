//! SurrealDB-backed LinkStore implementation
//!
//! Uses `schema::LinkEdgeRecord` for persistence, converting to
//! `storage_traits::LinkEdge` at the boundary.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle::{self, CloudConfig};
use crate::schema::{LinkEdgeRecord, PullRef};
use crate::storage_traits::{check_new_link, LinkEdge, LinkStore, StorageResult};

/// SurrealDB-backed implementation of [`LinkStore`].
#[derive(Clone)]
pub struct SurrealLinkStore {
    db: Surreal<Any>,
}

impl SurrealLinkStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_mem().await?;
        info!("SurrealLinkStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to SurrealDB Cloud.
    pub async fn cloud(config: &CloudConfig) -> crate::Result<Self> {
        let db = handle::connect_cloud(config).await?;
        info!("SurrealLinkStore connected (cloud)");
        Ok(Self { db })
    }

    /// Create from environment variables (cloud, `SURREALDB_URL`, or local file).
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch the row for `a <-> b` in either direction, if present.
    async fn find_edge(&self, a: &PullRef, b: &PullRef) -> StorageResult<Option<LinkEdgeRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM link_pull \
                 WHERE (source_key = $a AND link_key = $b) \
                    OR (source_key = $b AND link_key = $a) \
                 LIMIT 1",
            )
            .bind(("a", a.key()))
            .bind(("b", b.key()))
            .await?;

        let rows: Vec<LinkEdgeRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl LinkStore for SurrealLinkStore {
    #[instrument(skip(self), fields(source = %source, link = %link))]
    async fn insert_link(&self, source: &PullRef, link: &PullRef) -> StorageResult<LinkEdge> {
        check_new_link(source, link)?;

        if let Some(existing) = self.find_edge(source, link).await? {
            debug!("link already stored");
            return Ok(existing.into());
        }

        let row = LinkEdgeRecord::new(source, link);
        let created: Option<LinkEdgeRecord> = self.db.create("link_pull").content(row).await?;

        let created = created
            .ok_or_else(|| StorageError::Backend("link_pull insert returned no row".to_string()))?;
        info!("link stored");
        Ok(created.into())
    }

    async fn edges_touching(&self, pulls: &[PullRef]) -> StorageResult<Vec<LinkEdge>> {
        if pulls.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = pulls.iter().map(PullRef::key).collect();
        debug!(frontier = keys.len(), "querying edges");

        let mut res = self
            .db
            .query("SELECT * FROM link_pull WHERE source_key INSIDE $keys OR link_key INSIDE $keys")
            .bind(("keys", keys))
            .await?;

        let rows: Vec<LinkEdgeRecord> = res.take(0)?;
        Ok(rows.into_iter().map(LinkEdge::from).collect())
    }

    #[instrument(skip(self), fields(pull = %pull))]
    async fn delete_links(&self, pull: &PullRef) -> StorageResult<usize> {
        let mut res = self
            .db
            .query("DELETE link_pull WHERE source_key = $key OR link_key = $key RETURN BEFORE")
            .bind(("key", pull.key()))
            .await?;

        let removed: Vec<LinkEdgeRecord> = res.take(0)?;
        info!(removed = removed.len(), "links deleted");
        Ok(removed.len())
    }

    #[instrument(skip(self), fields(pull = %pull))]
    async fn update_tag(&self, pull: &PullRef, tag: Option<&str>) -> StorageResult<usize> {
        let mut res = self
            .db
            .query("UPDATE link_pull SET link_pr_tag = $tag WHERE link_key = $key")
            .query("UPDATE link_pull SET source_pr_tag = $tag WHERE source_key = $key")
            .bind(("tag", tag.map(str::to_string)))
            .bind(("key", pull.key()))
            .await?;

        let as_link: Vec<LinkEdgeRecord> = res.take(0)?;
        let as_source: Vec<LinkEdgeRecord> = res.take(1)?;
        debug!(updated = as_link.len() + as_source.len(), tag = ?tag, "readiness tag cached");
        Ok(as_link.len() + as_source.len())
    }
}
