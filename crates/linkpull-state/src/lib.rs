//! Linkpull-State: SurrealDB relation store for pull request links
//!
//! This crate owns the single durable table of the link engine: the
//! `link_pull` edges connecting pull requests across repositories.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: symmetric edge lookups, idempotent inserts, readiness tag caching.
//! Link trees are never stored; they are materialized by traversal in
//! `linkpull-core`.
//!
//! ## Key Components
//!
//! - `LinkStore`: backend-agnostic async trait over the edge table
//! - `SurrealLinkStore`: SurrealDB implementation (mem, surrealkv, ws)
//! - `MemoryLinkStore`: in-memory fake for tests
//! - `PullRef` / `LinkEdge`: the node and edge types shared with the engine

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::CloudConfig;
pub use schema::{LinkEdgeRecord, PullRef};
pub use storage_traits::{LinkEdge, LinkStore, StorageResult};
pub use surreal_store::SurrealLinkStore;

/// Result type for connection and schema setup
pub type Result<T> = std::result::Result<T, StateError>;
