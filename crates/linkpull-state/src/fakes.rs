//! In-memory fake for the link store (testing only)
//!
//! `MemoryLinkStore` satisfies the [`LinkStore`] contract without any external
//! dependencies, and can inject backend failures to exercise retry paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{LinkEdgeRecord, PullRef};
use crate::storage_traits::{check_new_link, LinkEdge, LinkStore, StorageResult};

/// In-memory edge table backed by a `Vec<LinkEdge>`.
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    edges: Mutex<Vec<LinkEdge>>,
    failing_writes: AtomicUsize,
    failing_reads: AtomicUsize,
    read_round_trips: AtomicUsize,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` mutating calls fail with a backend error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `edges_touching` calls fail with a backend error.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Number of `edges_touching` calls served so far.
    pub fn read_round_trips(&self) -> usize {
        self.read_round_trips.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored edge.
    pub fn all_edges(&self) -> Vec<LinkEdge> {
        self.edges.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_write(&self) -> StorageResult<()> {
        if Self::take_failure(&self.failing_writes) {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn insert_link(&self, source: &PullRef, link: &PullRef) -> StorageResult<LinkEdge> {
        check_new_link(source, link)?;
        self.check_write()?;
        let mut edges = self.edges.lock().unwrap();
        if let Some(existing) = edges.iter().find(|e| e.connects(source, link)) {
            return Ok(existing.clone());
        }
        let edge = LinkEdge::from(LinkEdgeRecord::new(source, link));
        edges.push(edge.clone());
        Ok(edge)
    }

    async fn edges_touching(&self, pulls: &[PullRef]) -> StorageResult<Vec<LinkEdge>> {
        if Self::take_failure(&self.failing_reads) {
            return Err(StorageError::Backend("injected read failure".to_string()));
        }
        self.read_round_trips.fetch_add(1, Ordering::SeqCst);
        let edges = self.edges.lock().unwrap();
        Ok(edges
            .iter()
            .filter(|e| pulls.iter().any(|p| e.touches(p)))
            .cloned()
            .collect())
    }

    async fn delete_links(&self, pull: &PullRef) -> StorageResult<usize> {
        self.check_write()?;
        let mut edges = self.edges.lock().unwrap();
        let before = edges.len();
        edges.retain(|e| !e.touches(pull));
        Ok(before - edges.len())
    }

    async fn update_tag(&self, pull: &PullRef, tag: Option<&str>) -> StorageResult<usize> {
        self.check_write()?;
        let mut edges = self.edges.lock().unwrap();
        let mut updated = 0;
        for edge in edges.iter_mut() {
            if edge.source == *pull {
                edge.source_pr_tag = tag.map(str::to_string);
                updated += 1;
            }
            if edge.link == *pull {
                edge.link_pr_tag = tag.map(str::to_string);
                updated += 1;
            }
        }
        Ok(updated)
    }
}
