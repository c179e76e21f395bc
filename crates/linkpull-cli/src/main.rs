//! `linkpull` - cross-repository pull request link coordination
//!
//! One invocation runs one action against the shared link store:
//!
//! - `link`: link `--pr` to `--target-pr`
//! - `verify`: list the PRs linked to or from `--pr`
//! - `delete`: drop every link of `--pr`
//! - `sync`: merge the link tree of `--pr` once every PR in it is ready
//! - `forced`: release the link tree of `--pr` regardless of readiness
//!
//! The exit status is non-zero when the action fails.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use linkpull_core::{
    parse_pull_url, ActionReport, LinkAction, LinkConfig, LinkEngine, LinkOutcome, Relation,
};
use linkpull_state::SurrealLinkStore;
use tracing::{info, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Behavior {
    Link,
    Verify,
    Delete,
    Sync,
    Forced,
}

#[derive(Debug, Parser)]
#[command(name = "linkpull")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Link dependent pull requests across repositories and merge them together", long_about = None)]
struct Cli {
    /// Action to run
    #[arg(long, value_enum)]
    behavior: Behavior,

    /// Pull request URL the action applies to (or `repo#number`)
    #[arg(long)]
    pr: String,

    /// Pull request to link to (`link` only)
    #[arg(long)]
    target_pr: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "LINKPULL_LOG_JSON")]
    log_json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn action(&self) -> Result<LinkAction> {
        let pull = parse_pull_url(&self.pr).with_context(|| format!("invalid --pr {}", self.pr))?;
        let action = match self.behavior {
            Behavior::Link => {
                let Some(target) = &self.target_pr else {
                    bail!("--target-pr is required for --behavior link");
                };
                let target =
                    parse_pull_url(target).with_context(|| format!("invalid --target-pr {target}"))?;
                LinkAction::Link {
                    source: pull,
                    target,
                }
            }
            Behavior::Verify => LinkAction::Verify { pull },
            Behavior::Delete => LinkAction::Delete { pull },
            Behavior::Sync => LinkAction::Sync { pull },
            Behavior::Forced => LinkAction::Force { pull },
        };
        Ok(action)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    linkpull_core::init_tracing(cli.log_json, level);

    let action = cli.action()?;
    let config = LinkConfig::from_env().context("Failed to load linkpull configuration")?;
    let store = SurrealLinkStore::from_env()
        .await
        .context("Failed to connect to the link store")?;
    let engine = LinkEngine::from_config(&config, Arc::new(store))
        .await
        .context("Failed to set up the link engine")?;

    info!(action = action.name(), pull = %action.pull(), "running");
    let report = engine.dispatch(&action).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn render_text(report: &ActionReport) -> String {
    let mut out = render_outcome(report.outcome());
    if let ActionReport::Relations(relations) = report {
        out.push_str(&render_relations("linked by me", &relations.linked_by_me));
        out.push_str(&render_relations("links to me", &relations.links_to_me));
    }
    out
}

fn render_outcome(outcome: &LinkOutcome) -> String {
    let status = if outcome.is_success() { "success" } else { "failed" };
    let mut out = format!("result: {status}\ndetail: {}\n", outcome.detail);
    if !outcome.merge_signal.is_empty() {
        let pulls: Vec<String> = outcome.merge_signal.iter().map(|p| p.key()).collect();
        out.push_str(&format!("merge: {}\n", pulls.join(", ")));
    }
    for warning in &outcome.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

fn render_relations(title: &str, relations: &[Relation]) -> String {
    let mut out = format!("{title}:\n");
    if relations.is_empty() {
        out.push_str("  (none)\n");
    }
    for r in relations {
        out.push_str(&format!("  {}#{}  {}  {}\n", r.repo, r.number, r.status, r.url));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpull_core::{FailureKind, PullRef, RelationsReport};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("linkpull").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_link_requires_target() {
        let cli = parse(&[
            "--behavior",
            "link",
            "--pr",
            "https://gitee.com/src-openeuler/zlib/pulls/1",
        ]);
        assert!(cli.action().is_err());

        let cli = parse(&[
            "--behavior",
            "link",
            "--pr",
            "https://gitee.com/src-openeuler/zlib/pulls/1",
            "--target-pr",
            "https://gitee.com/src-openeuler/curl/pulls/2",
        ]);
        assert_eq!(
            cli.action().unwrap(),
            LinkAction::Link {
                source: PullRef::new("zlib", 1),
                target: PullRef::new("curl", 2),
            }
        );
    }

    #[test]
    fn test_forced_maps_to_force_action() {
        let cli = parse(&["--behavior", "forced", "--pr", "kernel#12"]);
        assert_eq!(
            cli.action().unwrap(),
            LinkAction::Force {
                pull: PullRef::new("kernel", 12)
            }
        );
    }

    #[test]
    fn test_unknown_behavior_is_rejected() {
        assert!(Cli::try_parse_from(["linkpull", "--behavior", "merge", "--pr", "a#1"]).is_err());
    }

    #[test]
    fn test_bad_url_is_rejected() {
        let cli = parse(&["--behavior", "sync", "--pr", "not-a-pull"]);
        assert!(cli.action().is_err());
    }

    #[test]
    fn test_render_outcome_text() {
        let outcome = LinkOutcome::success("merge released for a#1, b#2")
            .with_merge_signal(vec![PullRef::new("a", 1), PullRef::new("b", 2)])
            .with_warnings(vec!["linkpull label not removed from b#2".into()]);
        let text = render_text(&ActionReport::Outcome(outcome));
        assert!(text.starts_with("result: success\n"));
        assert!(text.contains("merge: a#1, b#2\n"));
        assert!(text.contains("warning: linkpull label not removed from b#2\n"));

        let failed = LinkOutcome::failed(FailureKind::Validation, "target PR already merged: u");
        assert!(render_text(&ActionReport::Outcome(failed)).starts_with("result: failed\n"));
    }

    #[test]
    fn test_render_relations_text() {
        let report = ActionReport::Relations(RelationsReport {
            outcome: LinkOutcome::success("1 link relation(s)"),
            linked_by_me: vec![Relation {
                repo: "curl".into(),
                number: 2,
                url: "https://gitee.com/src-openeuler/curl/pulls/2".into(),
                status: "open".into(),
            }],
            links_to_me: vec![],
        });
        let text = render_text(&report);
        assert!(text.contains("linked by me:\n  curl#2  open  https://gitee.com/src-openeuler/curl/pulls/2\n"));
        assert!(text.contains("links to me:\n  (none)\n"));
    }
}
