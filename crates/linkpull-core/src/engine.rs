//! The link graph engine: link creation, relation queries, readiness
//! aggregation and merge dispatch.
//!
//! Public operations never return `Err`. Every [`LinkError`] is logged and
//! folded into a [`LinkOutcome`] at this boundary.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use linkpull_state::{LinkStore, PullRef};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::error::{BlockingPull, LinkError, LinkResult, Rejection, SetupError};
use crate::graph::{find_component, Component, Search};
use crate::host::gitee::GiteeClient;
use crate::host::{all_labels, PullState, RepoHost};
use crate::manifest::{normalize_package, ManifestResolver, RepoNameResolver, SpecManifestResolver};
use crate::oracle::{DependencyOracle, DnfDependencyOracle, StaticDependencyOracle};
use crate::outcome::{LinkOutcome, Relation, RelationsReport};
use crate::readiness::{tree_token, NodeReadiness, LINKPULL_LABEL};
use crate::retry::RetryPolicy;

/// How a component is being released, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeAudit {
    Synchronized,
    Forced,
}

impl MergeAudit {
    fn as_str(&self) -> &'static str {
        match self {
            MergeAudit::Synchronized => "synchronized_merge",
            MergeAudit::Forced => "force_merge",
        }
    }
}

fn operation_span(operation: &'static str, pull: &PullRef) -> Span {
    info_span!(
        "link_operation",
        operation,
        operation_id = %Uuid::new_v4(),
        repo = %pull.repo,
        pr = pull.number,
        peer = tracing::field::Empty,
    )
}

fn join_keys(pulls: &[PullRef]) -> String {
    pulls
        .iter()
        .map(PullRef::key)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coordinates link trees across the store, the code host and the
/// dependency oracle.
pub struct LinkEngine {
    store: Arc<dyn LinkStore>,
    host: Arc<dyn RepoHost>,
    oracle: Arc<dyn DependencyOracle>,
    manifest: Arc<dyn ManifestResolver>,
    retry: RetryPolicy,
}

impl LinkEngine {
    pub fn new(
        store: Arc<dyn LinkStore>,
        host: Arc<dyn RepoHost>,
        oracle: Arc<dyn DependencyOracle>,
        manifest: Arc<dyn ManifestResolver>,
    ) -> Self {
        Self {
            store,
            host,
            oracle,
            manifest,
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for store writes and traversal reads.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Wire the production collaborators around `store`.
    pub async fn from_config(config: &LinkConfig, store: Arc<dyn LinkStore>) -> Result<Self, SetupError> {
        let host = GiteeClient::new(config.host.clone(), config.retry)?;
        let oracle: Arc<dyn DependencyOracle> = match &config.dependents_file {
            Some(path) => Arc::new(StaticDependencyOracle::from_json_file(path).await?),
            None => Arc::new(DnfDependencyOracle::new(config.dnf_reposdir.clone())),
        };
        let manifest: Arc<dyn ManifestResolver> = if config.skip_spec {
            Arc::new(RepoNameResolver)
        } else {
            Arc::new(SpecManifestResolver::new(
                &config.workspace,
                &config.host.web_base,
                &config.host.owner,
            ))
        };
        Ok(Self::new(store, Arc::new(host), oracle, manifest).with_retry(config.retry))
    }

    // ---------------------------------------------------------------------
    // Public operations
    // ---------------------------------------------------------------------

    /// Link `source` to `target` after validating the request.
    pub async fn create_link(&self, source: &PullRef, target: &PullRef) -> LinkOutcome {
        let span = operation_span("create_link", source);
        span.record("peer", tracing::field::display(target));
        async { self.settle(self.try_create_link(source, target).await) }
            .instrument(span)
            .await
    }

    /// One-hop relations of `pull` with live peer states.
    pub async fn relations_of(&self, pull: &PullRef) -> RelationsReport {
        async {
            match self.try_relations_of(pull).await {
                Ok(report) => report,
                Err(e) => RelationsReport::failed(self.settle(Err(e))),
            }
        }
        .instrument(operation_span("relations_of", pull))
        .await
    }

    /// Remove every edge touching `pull`. Peers keep their labels.
    pub async fn delete_link(&self, pull: &PullRef) -> LinkOutcome {
        async {
            let result = self
                .retry
                .run("delete links", || self.store.delete_links(pull))
                .await
                .map_err(LinkError::from)
                .map(|removed| {
                    info!(removed, "links cleared");
                    LinkOutcome::success(format!("PR links cleared ({removed} removed)"))
                });
            self.settle(result)
        }
        .instrument(operation_span("delete_link", pull))
        .await
    }

    /// Re-evaluate the component of `pull` and release it when every node is
    /// ready.
    pub async fn evaluate_and_merge(&self, pull: &PullRef) -> LinkOutcome {
        async { self.settle(self.try_evaluate_and_merge(pull).await) }
            .instrument(operation_span("evaluate_and_merge", pull))
            .await
    }

    /// Release the component of `pull` regardless of readiness.
    pub async fn force_merge(&self, pull: &PullRef) -> LinkOutcome {
        async { self.settle(self.try_force_merge(pull).await) }
            .instrument(operation_span("force_merge", pull))
            .await
    }

    // ---------------------------------------------------------------------
    // Link creation
    // ---------------------------------------------------------------------

    async fn try_create_link(&self, source: &PullRef, target: &PullRef) -> LinkResult<LinkOutcome> {
        let target_url = self.host.pull_url(target);

        if source == target {
            return Err(self.reject(source, Rejection::SelfLink { url: target_url }).await);
        }

        let info = match self.host.get_pull(target).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                return Err(self.reject(source, Rejection::TargetNotFound { url: target_url }).await)
            }
            Err(e) => return Err(LinkError::transient("fetch target pull", e)),
        };
        match info.state {
            PullState::Merged => {
                return Err(self.reject(source, Rejection::TargetMerged { url: target_url }).await)
            }
            PullState::Closed => {
                return Err(self.reject(source, Rejection::TargetClosed { url: target_url }).await)
            }
            PullState::Open => {}
        }

        if source.repo == target.repo {
            return Err(self.reject(source, Rejection::SameRepository { url: target_url }).await);
        }

        if let Some(source_package) = self.unrelated_packages(source, target).await? {
            return Err(self
                .reject(
                    source,
                    Rejection::NoDependency {
                        source_package,
                        url: target_url,
                    },
                )
                .await);
        }

        self.check_graph_consistency(source, target).await?;

        let edge = match self
            .retry
            .run("insert link", || self.store.insert_link(source, target))
            .await
        {
            Ok(edge) => edge,
            Err(failure) => {
                self.comment(source, &format!("> link error for target PR {target_url}, please retry"))
                    .await;
                return Err(failure.into());
            }
        };
        info!(link_date = %edge.link_date, "link recorded");

        let mut warnings = Vec::new();
        warnings.extend(
            self.comment(source, &format!("> target PR linked: {target_url}"))
                .await,
        );
        for pull in [source, target] {
            if let Err(e) = self.host.add_label(pull, LINKPULL_LABEL).await {
                warn!(pull = %pull, error = %e, "linkpull label not applied");
                warnings.push(format!("linkpull label not applied to {pull}: {e}"));
            }
        }

        Ok(LinkOutcome::success(format!("target PR linked: {target_url}")).with_warnings(warnings))
    }

    /// `None` when a dependency exists between the two packages in either
    /// direction, otherwise the source package name for the rejection.
    async fn unrelated_packages(&self, source: &PullRef, target: &PullRef) -> LinkResult<Option<String>> {
        let source_package = normalize_package(&self.manifest.source_package(source).await);
        let dependents = self
            .oracle
            .dependents_of(&source_package)
            .await
            .map_err(|e| LinkError::transient("query dependents", e))?;
        if dependents.relates_to(&target.repo) {
            debug!(package = %source_package, "target depends on source");
            return Ok(None);
        }

        let target_package = normalize_package(&self.manifest.source_package(target).await);
        let dependents = self
            .oracle
            .dependents_of(&target_package)
            .await
            .map_err(|e| LinkError::transient("query dependents", e))?;
        if dependents.relates_to(&source.repo) {
            debug!(package = %target_package, "source depends on target");
            return Ok(None);
        }

        Ok(Some(source_package))
    }

    /// A tree holds at most one PR per repository and two existing trees are
    /// never joined.
    async fn check_graph_consistency(&self, source: &PullRef, target: &PullRef) -> LinkResult<()> {
        let from_target = find_component(&*self.store, target, Some(&source.repo), &self.retry).await?;
        if let Search::Found { found, edge, .. } = &from_target {
            let contact = edge.peer_of(found).unwrap_or(found).clone();
            return Err(self.already_linked(source, contact).await);
        }

        let from_source = find_component(&*self.store, source, Some(&target.repo), &self.retry).await?;
        match &from_source {
            Search::Found { found, .. } => Err(self.already_linked(source, found.clone()).await),
            Search::Complete(tree) if tree.is_linked() && from_target.component().is_linked() => {
                let contact = tree
                    .edges
                    .iter()
                    .find_map(|e| e.peer_of(source))
                    .unwrap_or(source)
                    .clone();
                let contact_url = self.host.pull_url(&contact);
                Err(self
                    .reject(source, Rejection::SeparateLinkTree { contact, contact_url })
                    .await)
            }
            Search::Complete(_) => Ok(()),
        }
    }

    async fn already_linked(&self, source: &PullRef, contact: PullRef) -> LinkError {
        let contact_url = self.host.pull_url(&contact);
        self.reject(source, Rejection::AlreadyLinked { contact, contact_url })
            .await
    }

    // ---------------------------------------------------------------------
    // Relations
    // ---------------------------------------------------------------------

    async fn try_relations_of(&self, pull: &PullRef) -> LinkResult<RelationsReport> {
        let edges = self
            .retry
            .run("read link edges", || {
                self.store.edges_touching(std::slice::from_ref(pull))
            })
            .await?;

        let peers: Vec<(bool, PullRef)> = edges
            .iter()
            .filter_map(|e| e.peer_of(pull).map(|peer| (e.source == *pull, peer.clone())))
            .collect();
        let states = join_all(peers.iter().map(|(_, peer)| self.live_status(peer))).await;

        let mut linked_by_me = Vec::new();
        let mut links_to_me = Vec::new();
        for ((outgoing, peer), status) in peers.into_iter().zip(states) {
            let relation = Relation {
                url: self.host.pull_url(&peer),
                repo: peer.repo,
                number: peer.number,
                status,
            };
            if outgoing {
                linked_by_me.push(relation);
            } else {
                links_to_me.push(relation);
            }
        }

        let detail = if edges.is_empty() {
            format!("no link relations for {}", self.host.pull_url(pull))
        } else {
            format!("{} link relation(s)", edges.len())
        };
        Ok(RelationsReport {
            outcome: LinkOutcome::success(detail),
            linked_by_me,
            links_to_me,
        })
    }

    async fn live_status(&self, pull: &PullRef) -> String {
        match self.host.get_pull(pull).await {
            Ok(info) => info.state.to_string(),
            Err(e) => {
                warn!(peer = %pull, error = %e, "peer state unavailable");
                "unknown".to_string()
            }
        }
    }

    // ---------------------------------------------------------------------
    // Readiness and merge dispatch
    // ---------------------------------------------------------------------

    async fn try_evaluate_and_merge(&self, pull: &PullRef) -> LinkResult<LinkOutcome> {
        let component = find_component(&*self.store, pull, None, &self.retry)
            .await?
            .into_component();
        if !component.is_linked() {
            info!("no linked pull requests");
            return Err(Rejection::NotLinked {
                url: self.host.pull_url(pull),
            }
            .into());
        }

        let verdicts = self.assess_component(&component).await?;
        let mut warnings = self.cache_tokens(&verdicts).await;

        let blocking: Vec<BlockingPull> = verdicts
            .iter()
            .filter(|v| !v.is_ready())
            .map(|v| v.blocking(self.host.pull_url(&v.pull)))
            .collect();
        if !blocking.is_empty() {
            return Err(self.reject(pull, Rejection::NotReady { blocking }).await);
        }

        let (released, release_warnings) = self.release(&component.nodes, MergeAudit::Synchronized).await?;
        warnings.extend(release_warnings);
        Ok(LinkOutcome::success(format!("merge released for {}", join_keys(&released)))
            .with_warnings(warnings)
            .with_merge_signal(released))
    }

    async fn try_force_merge(&self, pull: &PullRef) -> LinkResult<LinkOutcome> {
        let component = find_component(&*self.store, pull, None, &self.retry)
            .await?
            .into_component();

        let audit = MergeAudit::Forced.as_str();
        let mut not_ready = Vec::new();
        for verdict in join_all(component.nodes.iter().map(|n| self.assess_node(n))).await {
            match verdict {
                Ok(v) if !v.is_ready() => {
                    warn!(audit, pull = %v.pull, state = %v.state, missing = ?v.missing, "forcing past unmet readiness");
                    not_ready.push(v.pull.key());
                }
                Ok(_) => {}
                Err(e) => warn!(audit, error = %e, "readiness unknown, forcing anyway"),
            }
        }
        warn!(
            audit,
            nodes = component.nodes.len(),
            not_ready = ?not_ready,
            "force merge requested"
        );

        let (released, warnings) = self.release(&component.nodes, MergeAudit::Forced).await?;
        let mut detail = format!("force merge released {}", join_keys(&released));
        if !not_ready.is_empty() {
            detail.push_str(&format!("; not ready: {}", not_ready.join(", ")));
        }
        Ok(LinkOutcome::success(detail)
            .with_warnings(warnings)
            .with_merge_signal(released))
    }

    async fn assess_component(&self, component: &Component) -> LinkResult<Vec<NodeReadiness>> {
        join_all(component.nodes.iter().map(|n| self.assess_node(n)))
            .await
            .into_iter()
            .collect()
    }

    /// Live lifecycle state and labels of one node.
    async fn assess_node(&self, pull: &PullRef) -> LinkResult<NodeReadiness> {
        let info = self
            .host
            .get_pull(pull)
            .await
            .map_err(|e| LinkError::transient(format!("fetch pull {pull}"), e))?;
        let labels = all_labels(&*self.host, pull)
            .await
            .map_err(|e| LinkError::transient(format!("list labels of {pull}"), e))?;
        let verdict = NodeReadiness::assess(pull, info.state, &labels);
        debug!(pull = %pull, state = %info.state, missing = ?verdict.missing, "node assessed");
        Ok(verdict)
    }

    /// Best-effort: a failed write only costs the cache.
    async fn cache_tokens(&self, verdicts: &[NodeReadiness]) -> Vec<String> {
        let token = tree_token(verdicts);
        let mut warnings = Vec::new();
        for verdict in verdicts {
            let written = self
                .retry
                .run("update readiness tag", || self.store.update_tag(&verdict.pull, token))
                .await;
            if let Err(failure) = written {
                warn!(pull = %verdict.pull, error = %failure, "readiness tag not cached");
                warnings.push(failure.to_string());
            }
        }
        warnings
    }

    /// Clear stored edges and the `linkpull` label on every node.
    async fn release(
        &self,
        nodes: &BTreeSet<PullRef>,
        audit: MergeAudit,
    ) -> LinkResult<(Vec<PullRef>, Vec<String>)> {
        let mut released = Vec::new();
        let mut failed = Vec::new();
        let mut warnings = Vec::new();

        for node in nodes {
            match self
                .retry
                .run("delete links", || self.store.delete_links(node))
                .await
            {
                Ok(removed) => debug!(pull = %node, removed, "stored links cleared"),
                Err(failure) => {
                    error!(pull = %node, error = %failure, "stored links not cleared");
                    failed.push(format!("{node}: {failure}"));
                    continue;
                }
            }

            match self.host.remove_label(node, LINKPULL_LABEL).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(pull = %node, "linkpull label already absent"),
                Err(e) => {
                    warn!(pull = %node, error = %e, "linkpull label not removed");
                    warnings.push(format!("linkpull label not removed from {node}: {e}"));
                    let body = match audit {
                        MergeAudit::Synchronized => "> merge conditions are met (all linked PRs carry lgtm, approved and openeuler-cla/yes), but the linkpull label could not be removed; a forced merge can be used",
                        MergeAudit::Forced => "> forced merge: the linkpull label could not be removed, please retry",
                    };
                    warnings.extend(self.comment(node, body).await);
                }
            }

            match audit {
                MergeAudit::Synchronized => {
                    info!(audit = audit.as_str(), pull = %node, "coordination markers cleared")
                }
                MergeAudit::Forced => {
                    warn!(audit = audit.as_str(), pull = %node, "coordination markers cleared")
                }
            }
            released.push(node.clone());
        }

        if !failed.is_empty() {
            return Err(LinkError::Partial {
                completed: format!("released {}", join_keys(&released)),
                failed: format!("stored links not cleared for {}", failed.join("; ")),
            });
        }
        Ok((released, warnings))
    }

    // ---------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------

    /// Post a comment; a failure is returned as a warning, never raised.
    async fn comment(&self, pull: &PullRef, body: &str) -> Option<String> {
        match self.host.create_comment(pull, body).await {
            Ok(id) => {
                debug!(pull = %pull, comment_id = id, "comment posted");
                None
            }
            Err(e) => {
                warn!(pull = %pull, error = %e, "comment not posted");
                Some(format!("comment on {pull} not posted: {e}"))
            }
        }
    }

    /// Log and report a validation failure on `pull`.
    async fn reject(&self, pull: &PullRef, rejection: Rejection) -> LinkError {
        warn!(reason = %rejection, "request rejected");
        self.comment(pull, &format!("> {rejection}")).await;
        LinkError::Validation(rejection)
    }

    fn settle(&self, result: LinkResult<LinkOutcome>) -> LinkOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    LinkError::Validation(_) => {}
                    LinkError::Transient { .. } | LinkError::Partial { .. } => {
                        error!(error = %e, "operation failed")
                    }
                }
                LinkOutcome::from(&e)
            }
        }
    }
}
