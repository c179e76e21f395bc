//! Source package resolution for a pull request.
//!
//! The package named by a PR's spec file at its merge ref is what the
//! dependency oracle is asked about. Resolution never fails: any problem
//! falls back to the repository name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use linkpull_state::PullRef;
use regex::{Captures, Regex};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("git {step} failed: {detail}")]
    Git { step: String, detail: String },

    #[error("no spec file in {0}")]
    NoSpec(PathBuf),

    #[error("spec file {0} has no Name tag")]
    NoName(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ManifestResolver: Send + Sync {
    /// Source package name of `pull`, before normalization.
    async fn source_package(&self, pull: &PullRef) -> String;
}

/// Package name as queried from the oracle (`python-x` becomes `python3-x`).
pub fn normalize_package(name: &str) -> String {
    name.replace("python-", "python3-")
}

/// Uses the repository name as the package name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoNameResolver;

#[async_trait]
impl ManifestResolver for RepoNameResolver {
    async fn source_package(&self, pull: &PullRef) -> String {
        pull.repo.clone()
    }
}

/// Fetches the PR merge ref and reads `Name:` from its spec file.
#[derive(Debug, Clone)]
pub struct SpecManifestResolver {
    workspace: PathBuf,
    /// `<web_base>/<owner>`
    clone_base: String,
}

impl SpecManifestResolver {
    pub fn new(workspace: impl Into<PathBuf>, web_base: &str, owner: &str) -> Self {
        Self {
            workspace: workspace.into(),
            clone_base: format!("{}/{}", web_base.trim_end_matches('/'), owner),
        }
    }

    async fn git(dir: &Path, step: &str, args: &[&str]) -> Result<(), ManifestError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| ManifestError::Git {
                step: step.to_string(),
                detail: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ManifestError::Git {
                step: step.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_in(&self, checkout: &Path, pull: &PullRef) -> Result<String, ManifestError> {
        let url = format!("{}/{}.git", self.clone_base, pull.repo);
        let refspec = format!(
            "+refs/pull/{n}/MERGE:refs/pull/{n}/MERGE",
            n = pull.number
        );
        let branch = format!("pull/{}/MERGE", pull.number);

        tokio::fs::create_dir_all(checkout).await?;
        Self::git(checkout, "init", &["init", "--quiet"]).await?;
        Self::git(checkout, "fetch", &["fetch", "--depth", "1", &url, &refspec]).await?;
        Self::git(checkout, "checkout", &["checkout", "-f", "--quiet", &branch]).await?;

        let spec = find_spec_file(checkout).await?.ok_or_else(|| ManifestError::NoSpec(checkout.to_path_buf()))?;
        let text = tokio::fs::read_to_string(&spec).await?;
        parse_spec_name(&text).ok_or(ManifestError::NoName(spec))
    }
}

#[async_trait]
impl ManifestResolver for SpecManifestResolver {
    async fn source_package(&self, pull: &PullRef) -> String {
        if pull.repo == "kernel" {
            return pull.repo.clone();
        }
        let checkout = self
            .workspace
            .join(format!("{}-{}-{}", pull.repo, pull.number, Uuid::new_v4().simple()));

        let resolved = self.resolve_in(&checkout, pull).await;

        if let Err(e) = tokio::fs::remove_dir_all(&checkout).await {
            debug!(path = %checkout.display(), error = %e, "checkout cleanup skipped");
        }

        match resolved {
            Ok(name) => {
                info!(pull = %pull, package = %name, "source package resolved from spec");
                name
            }
            Err(e) => {
                warn!(pull = %pull, error = %e, "falling back to repository name");
                pull.repo.clone()
            }
        }
    }
}

/// First `*.spec` file under `root` in path order, skipping `.git`.
///
/// Files of a directory are considered before its subdirectories.
async fn find_spec_file(root: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let kind = entry.file_type().await?;
            if kind.is_dir() {
                if path.file_name().is_some_and(|n| n != ".git") {
                    dirs.push(path);
                }
            } else if kind.is_file() {
                files.push(path);
            }
        }

        files.sort();
        if let Some(spec) = files
            .into_iter()
            .find(|p| p.extension().is_some_and(|ext| ext == "spec"))
        {
            return Ok(Some(spec));
        }
        dirs.sort();
        pending.extend(dirs.into_iter().rev());
    }
    Ok(None)
}

fn macro_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"%(?:\{(\?)?([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("static macro pattern")
    })
}

/// Read the `Name:` tag of an RPM spec, expanding `%global`/`%define` macros.
pub fn parse_spec_name(spec: &str) -> Option<String> {
    let mut macros: HashMap<String, String> = HashMap::new();
    let mut name = None;

    for line in spec.lines().map(str::trim) {
        if let Some(rest) = line
            .strip_prefix("%global")
            .or_else(|| line.strip_prefix("%define"))
        {
            let mut parts = rest.trim().splitn(2, char::is_whitespace);
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                let value = expand_macros(value.trim(), &macros);
                macros.insert(key.to_string(), value);
            }
            continue;
        }
        if name.is_none() {
            if let Some((tag, value)) = line.split_once(':') {
                if tag.trim().eq_ignore_ascii_case("name") {
                    name = Some(value.trim().to_string());
                    macros.insert("name".into(), value.trim().to_string());
                }
            }
        }
    }

    name.map(|n| expand_macros(&n, &macros))
        .filter(|n| !n.is_empty())
}

fn expand_macros(value: &str, macros: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..8 {
        let next = macro_ref()
            .replace_all(&current, |caps: &Captures| {
                let optional = caps.get(1).is_some();
                let key = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                match macros.get(key) {
                    Some(v) => v.clone(),
                    None if optional => String::new(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}
