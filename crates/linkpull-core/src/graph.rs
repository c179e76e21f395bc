//! Link tree discovery.
//!
//! Link trees are never stored. A tree is the connected component of a PR in
//! the undirected edge relation and is rebuilt on demand by a
//! frontier-at-a-time breadth-first search: every round asks the store for
//! all edges touching the current frontier in one query, so a component of
//! diameter `d` costs `d + 1` round trips.
//!
//! Nodes are PRs `(repo, number)`. Two PRs of the same repository are
//! different nodes.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use linkpull_state::{LinkEdge, LinkStore, PullRef};
use tracing::debug;

use crate::error::LinkResult;
use crate::retry::RetryPolicy;

/// A materialized link tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub seed: PullRef,
    /// Every PR reached, the seed included.
    pub nodes: BTreeSet<PullRef>,
    /// Every distinct edge seen while walking the component.
    pub edges: Vec<LinkEdge>,
    /// Store round trips spent.
    pub rounds: usize,
}

impl Component {
    fn singleton(seed: &PullRef) -> Self {
        Self {
            seed: seed.clone(),
            nodes: BTreeSet::from([seed.clone()]),
            edges: Vec::new(),
            rounds: 0,
        }
    }

    /// Whether the seed has at least one edge.
    pub fn is_linked(&self) -> bool {
        !self.edges.is_empty()
    }

    pub fn contains(&self, pull: &PullRef) -> bool {
        self.nodes.contains(pull)
    }

    /// Cached readiness tag per node, as last written to the store.
    pub fn cached_tags(&self) -> BTreeMap<PullRef, Option<String>> {
        let mut tags: BTreeMap<PullRef, Option<String>> = BTreeMap::new();
        for edge in &self.edges {
            for node in [&edge.source, &edge.link] {
                let tag = edge.tag_of(node).map(str::to_string);
                let slot = tags.entry(node.clone()).or_insert(None);
                if slot.is_none() {
                    *slot = tag;
                }
            }
        }
        tags
    }
}

/// Result of a walk that may stop early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Search {
    /// The whole component was walked.
    Complete(Component),
    /// A PR of the requested repository was discovered. `edge` is the edge
    /// through which it was reached and `found` the discovered PR.
    Found {
        found: PullRef,
        edge: LinkEdge,
        partial: Component,
    },
}

impl Search {
    /// The component walked so far.
    pub fn component(&self) -> &Component {
        match self {
            Search::Complete(c) => c,
            Search::Found { partial, .. } => partial,
        }
    }

    pub fn into_component(self) -> Component {
        match self {
            Search::Complete(c) => c,
            Search::Found { partial, .. } => partial,
        }
    }
}

/// Walk the component of `seed`.
///
/// With `stop_at_repo`, the walk ends as soon as a PR of that repository
/// other than the seed is discovered. Store reads are retried with `retry`.
pub async fn find_component(
    store: &dyn LinkStore,
    seed: &PullRef,
    stop_at_repo: Option<&str>,
    retry: &RetryPolicy,
) -> LinkResult<Search> {
    let mut component = Component::singleton(seed);
    let mut seen_edges: HashSet<(PullRef, PullRef)> = HashSet::new();
    let mut frontier = vec![seed.clone()];

    while !frontier.is_empty() {
        component.rounds += 1;
        let batch = retry
            .run("read link edges", || store.edges_touching(&frontier))
            .await?;

        let mut next = Vec::new();
        for edge in batch {
            if !seen_edges.insert((edge.source.clone(), edge.link.clone())) {
                continue;
            }
            component.edges.push(edge.clone());

            let endpoints = [edge.source.clone(), edge.link.clone()];
            for node in endpoints {
                if !component.nodes.insert(node.clone()) {
                    continue;
                }
                if stop_at_repo.is_some_and(|repo| node.repo == repo) {
                    debug!(seed = %seed, found = %node, rounds = component.rounds, "stopping traversal early");
                    return Ok(Search::Found {
                        found: node,
                        edge,
                        partial: component,
                    });
                }
                next.push(node);
            }
        }
        frontier = next;
    }

    debug!(
        seed = %seed,
        nodes = component.nodes.len(),
        edges = component.edges.len(),
        rounds = component.rounds,
        "component materialized"
    );
    Ok(Search::Complete(component))
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_state::fakes::MemoryLinkStore;

    fn pr(repo: &str, n: u64) -> PullRef {
        PullRef::new(repo, n)
    }

    async fn chain(store: &MemoryLinkStore, len: usize) -> Vec<PullRef> {
        let nodes: Vec<PullRef> = (0..len).map(|i| pr(&format!("repo{i}"), 1)).collect();
        for pair in nodes.windows(2) {
            store.insert_link(&pair[0], &pair[1]).await.unwrap();
        }
        nodes
    }

    #[tokio::test]
    async fn test_unlinked_seed_is_singleton() {
        let store = MemoryLinkStore::new();
        let search = find_component(&store, &pr("a", 1), None, &RetryPolicy::no_retry())
            .await
            .unwrap();
        let component = search.into_component();
        assert_eq!(component.nodes.len(), 1);
        assert!(!component.is_linked());
    }

    #[tokio::test]
    async fn test_chain_is_complete_from_any_node() {
        let store = MemoryLinkStore::new();
        let nodes = chain(&store, 5).await;

        for seed in &nodes {
            let component = find_component(&store, seed, None, &RetryPolicy::no_retry())
                .await
                .unwrap()
                .into_component();
            assert_eq!(component.nodes, nodes.iter().cloned().collect::<BTreeSet<_>>());
            assert_eq!(component.edges.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_round_trips_bounded_by_diameter() {
        let store = MemoryLinkStore::new();
        let nodes = chain(&store, 6).await;

        let before = store.read_round_trips();
        let component = find_component(&store, &nodes[0], None, &RetryPolicy::no_retry())
            .await
            .unwrap()
            .into_component();
        // diameter 5 from an end node: 5 rounds that discover nodes, one that finds nothing new
        assert_eq!(component.rounds, 6);
        assert_eq!(store.read_round_trips() - before, 6);
    }

    #[tokio::test]
    async fn test_star_costs_two_rounds() {
        let store = MemoryLinkStore::new();
        let hub = pr("hub", 1);
        for i in 0..10 {
            store.insert_link(&pr(&format!("leaf{i}"), 1), &hub).await.unwrap();
        }
        let component = find_component(&store, &hub, None, &RetryPolicy::no_retry())
            .await
            .unwrap()
            .into_component();
        assert_eq!(component.nodes.len(), 11);
        assert_eq!(component.rounds, 2);
    }

    #[tokio::test]
    async fn test_same_repo_different_number_is_separate_node() {
        let store = MemoryLinkStore::new();
        store.insert_link(&pr("a", 1), &pr("b", 1)).await.unwrap();
        store.insert_link(&pr("a", 2), &pr("c", 1)).await.unwrap();

        let component = find_component(&store, &pr("a", 1), None, &RetryPolicy::no_retry())
            .await
            .unwrap()
            .into_component();
        assert!(!component.contains(&pr("a", 2)));
        assert!(!component.contains(&pr("c", 1)));
    }

    #[tokio::test]
    async fn test_early_exit_on_repo() {
        let store = MemoryLinkStore::new();
        let nodes = chain(&store, 6).await;

        let search = find_component(&store, &nodes[0], Some("repo2"), &RetryPolicy::no_retry())
            .await
            .unwrap();
        match search {
            Search::Found {
                found,
                edge,
                partial,
            } => {
                assert_eq!(found, nodes[2]);
                assert!(edge.connects(&nodes[1], &nodes[2]));
                assert_eq!(partial.rounds, 2);
                assert!(!partial.contains(&nodes[4]));
            }
            other => panic!("expected early exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_seed_repo_does_not_trigger_early_exit() {
        let store = MemoryLinkStore::new();
        store.insert_link(&pr("a", 1), &pr("b", 1)).await.unwrap();
        let search = find_component(&store, &pr("a", 1), Some("a"), &RetryPolicy::no_retry())
            .await
            .unwrap();
        assert!(matches!(search, Search::Complete(_)));
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let store = MemoryLinkStore::new();
        store.insert_link(&pr("a", 1), &pr("b", 1)).await.unwrap();
        store.insert_link(&pr("b", 1), &pr("c", 1)).await.unwrap();
        store.insert_link(&pr("c", 1), &pr("a", 1)).await.unwrap();

        let component = find_component(&store, &pr("b", 1), None, &RetryPolicy::no_retry())
            .await
            .unwrap()
            .into_component();
        assert_eq!(component.nodes.len(), 3);
        assert_eq!(component.edges.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_failure_is_retried() {
        let store = MemoryLinkStore::new();
        store.insert_link(&pr("a", 1), &pr("b", 1)).await.unwrap();
        store.fail_next_reads(2);

        let component = find_component(&store, &pr("a", 1), None, &RetryPolicy::new(3, 10))
            .await
            .unwrap()
            .into_component();
        assert_eq!(component.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_cached_tags() {
        let store = MemoryLinkStore::new();
        store.insert_link(&pr("a", 1), &pr("b", 1)).await.unwrap();
        store.update_tag(&pr("a", 1), Some("lgtm,approved,openeuler-cla/yes")).await.unwrap();

        let component = find_component(&store, &pr("a", 1), None, &RetryPolicy::no_retry())
            .await
            .unwrap()
            .into_component();
        let tags = component.cached_tags();
        assert!(tags[&pr("a", 1)].is_some());
        assert!(tags[&pr("b", 1)].is_none());
    }
}
