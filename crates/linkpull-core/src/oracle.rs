//! Reverse-dependency oracle: which packages depend on a given package.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to run {command}: {detail}")]
    Spawn { command: String, detail: String },

    #[error("dependency query for {package} failed: {detail}")]
    Query { package: String, detail: String },

    #[error("invalid dependents table {path}: {detail}")]
    Table { path: PathBuf, detail: String },
}

impl Retryable for OracleError {
    fn is_transient(&self) -> bool {
        !matches!(self, OracleError::Table { .. })
    }
}

/// Packages depending on a package, split by dependency kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependents {
    #[serde(default)]
    pub build: BTreeSet<String>,
    #[serde(default)]
    pub install: BTreeSet<String>,
}

impl Dependents {
    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.install.is_empty()
    }

    /// Whether `repo` appears among the build or install dependents.
    ///
    /// Comparison is case-insensitive, and `python3-` package names match
    /// `python-` repository names.
    pub fn relates_to(&self, repo: &str) -> bool {
        let wanted = repo.to_lowercase();
        self.build
            .iter()
            .chain(self.install.iter())
            .any(|pkg| pkg.to_lowercase().replace("python3-", "python-") == wanted)
    }
}

#[async_trait]
pub trait DependencyOracle: Send + Sync {
    async fn dependents_of(&self, package: &str) -> Result<Dependents, OracleError>;
}

fn nevra_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\d+:.*").expect("static NEVRA pattern"))
}

/// Parse `dnf repoquery --whatdepends` output.
///
/// Lines ending in `.src` are build dependents, all others install
/// dependents. The `-<epoch>:<version>...` suffix is stripped.
pub fn parse_repoquery(output: &str) -> Dependents {
    let mut deps = Dependents::default();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let name = nevra_suffix().replace(line, "").into_owned();
        if name.is_empty() {
            continue;
        }
        if line.ends_with(".src") {
            deps.build.insert(name);
        } else {
            deps.install.insert(name);
        }
    }
    deps
}

/// Oracle backed by `dnf repoquery --whatdepends`.
#[derive(Debug, Clone, Default)]
pub struct DnfDependencyOracle {
    reposdir: Option<PathBuf>,
}

impl DnfDependencyOracle {
    pub fn new(reposdir: Option<PathBuf>) -> Self {
        Self { reposdir }
    }
}

#[async_trait]
impl DependencyOracle for DnfDependencyOracle {
    async fn dependents_of(&self, package: &str) -> Result<Dependents, OracleError> {
        let mut cmd = Command::new("dnf");
        if let Some(dir) = &self.reposdir {
            cmd.arg(format!("--setopt=reposdir={}", dir.display()));
        }
        cmd.args(["repoquery", "--whatdepends", package]);

        let output = cmd.output().await.map_err(|e| OracleError::Spawn {
            command: "dnf".into(),
            detail: e.to_string(),
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            error!(package, %stderr, "dependency query failed");
            return Err(OracleError::Query {
                package: package.to_string(),
                detail: stderr.trim().to_string(),
            });
        }

        let deps = parse_repoquery(&String::from_utf8_lossy(&output.stdout));
        debug!(
            package,
            build = deps.build.len(),
            install = deps.install.len(),
            "dependents resolved"
        );
        Ok(deps)
    }
}

/// Oracle answering from a fixed table. Unknown packages have no dependents.
///
/// The JSON form is `{"<package>": {"build": [...], "install": [...]}}`.
#[derive(Debug, Clone, Default)]
pub struct StaticDependencyOracle {
    table: HashMap<String, Dependents>,
}

impl StaticDependencyOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, package: &str, build: &[&str], install: &[&str]) -> Self {
        self.table.insert(
            package.to_string(),
            Dependents {
                build: build.iter().map(|s| s.to_string()).collect(),
                install: install.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub async fn from_json_file(path: &Path) -> Result<Self, OracleError> {
        let table_err = |detail: String| OracleError::Table {
            path: path.to_path_buf(),
            detail,
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| table_err(e.to_string()))?;
        let table = serde_json::from_str(&raw).map_err(|e| table_err(e.to_string()))?;
        Ok(Self { table })
    }
}

#[async_trait]
impl DependencyOracle for StaticDependencyOracle {
    async fn dependents_of(&self, package: &str) -> Result<Dependents, OracleError> {
        Ok(self.table.get(package).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repoquery_splits_build_and_install() {
        let output = "\
curl-0:7.79.1-2.oe2203.src
libcurl-devel-0:7.79.1-2.oe2203.x86_64
python3-pycurl-0:7.43.0.6-5.oe2203.x86_64
python-pycurl-0:7.43.0.6-5.oe2203.src
";
        let deps = parse_repoquery(output);
        assert_eq!(
            deps.build,
            ["curl", "python-pycurl"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(
            deps.install,
            ["libcurl-devel", "python3-pycurl"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
    }

    #[test]
    fn test_parse_repoquery_ignores_blank_lines() {
        assert!(parse_repoquery("\n  \n").is_empty());
    }

    #[test]
    fn test_relates_to_is_case_insensitive_and_maps_python3() {
        let deps = Dependents {
            build: BTreeSet::new(),
            install: ["python3-Requests".to_string()].into_iter().collect(),
        };
        assert!(deps.relates_to("python-requests"));
        assert!(!deps.relates_to("python3-requests-toolbelt"));
    }

    #[tokio::test]
    async fn test_static_oracle_unknown_package_is_empty() {
        let oracle = StaticDependencyOracle::new().with("zlib", &["curl"], &[]);
        assert!(oracle.dependents_of("openssl").await.unwrap().is_empty());
        assert!(oracle.dependents_of("zlib").await.unwrap().relates_to("curl"));
    }

    #[tokio::test]
    async fn test_static_oracle_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.json");
        std::fs::write(&path, r#"{"zlib": {"build": ["curl"], "install": ["libpng"]}}"#).unwrap();

        let oracle = StaticDependencyOracle::from_json_file(&path).await.unwrap();
        let deps = oracle.dependents_of("zlib").await.unwrap();
        assert!(deps.relates_to("libpng"));
    }

    #[tokio::test]
    async fn test_static_oracle_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.json");
        std::fs::write(&path, "not json").unwrap();
        let err = StaticDependencyOracle::from_json_file(&path).await.unwrap_err();
        assert!(matches!(err, OracleError::Table { .. }));
        assert!(!err.is_transient());
    }
}
