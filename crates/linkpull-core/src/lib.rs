//! Linkpull-Core: the PR link graph engine
//!
//! Records dependency links between pull requests in different package
//! repositories, refuses links that would break the one-tree-per-PR rule,
//! walks link trees on demand and turns the readiness of every PR in a tree
//! into a single merge decision.
//!
//! ## Layer 1 - Domain
//!
//! - [`LinkEngine`]: `create_link`, `relations_of`, `delete_link`,
//!   `evaluate_and_merge`, `force_merge`, and [`LinkEngine::dispatch`]
//! - [`graph`]: frontier-at-a-time BFS over the relation store
//! - [`host`]: code host adapter (`RepoHost`, Gitee client, in-memory fake)
//! - [`oracle`]: reverse-dependency lookups (`dnf repoquery`, static table)
//! - [`manifest`]: source package names from spec files
//! - [`retry`]: bounded fixed-delay retry for transient failures

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod host;
pub mod manifest;
pub mod oracle;
pub mod outcome;
pub mod pull;
pub mod readiness;
pub mod retry;
pub mod telemetry;

pub use action::{ActionReport, LinkAction};
pub use config::{ConfigError, HostConfig, LinkConfig};
pub use engine::LinkEngine;
pub use error::{BlockingPull, LinkError, LinkResult, Rejection, SetupError};
pub use graph::{find_component, Component, Search};
pub use host::{HostError, PullInfo, PullState, RepoHost};
pub use oracle::{Dependents, DependencyOracle};
pub use outcome::{FailureKind, LinkOutcome, OutcomeStatus, Relation, RelationsReport};
pub use pull::{parse_pull_url, pull_url, PullUrlError};
pub use readiness::{tree_token, NodeReadiness, LINKPULL_LABEL, MERGE_TOKEN, REQUIRED_LABELS};
pub use retry::{RetryPolicy, Retryable};
pub use telemetry::init_tracing;

pub use linkpull_state::{LinkEdge, LinkStore, PullRef};
