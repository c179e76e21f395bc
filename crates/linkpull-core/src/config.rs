//! Environment-driven configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `GITEE_TOKEN` | required |
//! | `GITEE_OWNER` | `src-openeuler` |
//! | `GITEE_API` | `https://gitee.com/api/v5/repos` |
//! | `GITEE_WEB` | `https://gitee.com` |
//! | `GITEE_TIMEOUT_SECS` | `30` |
//! | `LINKPULL_RETRY_ATTEMPTS` | `3` |
//! | `LINKPULL_RETRY_WAIT_MS` | `2000` |
//! | `LINKPULL_WORKSPACE` | `/tmp/linkpull` |
//! | `LINKPULL_DEPENDENTS_FILE` | unset (use `dnf repoquery`) |
//! | `LINKPULL_DNF_REPOSDIR` | unset |
//! | `LINKPULL_SKIP_SPEC` | unset (resolve package names from spec files) |
//!
//! Store connection variables (`SURREALDB_*`) are read by `linkpull-state`.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_OWNER: &str = "src-openeuler";
pub const DEFAULT_API_BASE: &str = "https://gitee.com/api/v5/repos";
pub const DEFAULT_WEB_BASE: &str = "https://gitee.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WORKSPACE: &str = "/tmp/linkpull";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

/// Parse an optional environment variable.
pub(crate) fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Code host connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// REST API base, up to and including `/repos`
    pub api_base: String,
    /// Web base used to render PR links in comments
    pub web_base: String,
    /// Organization owning every repository
    pub owner: String,
    pub token: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field("api_base", &self.api_base)
            .field("web_base", &self.web_base)
            .field("owner", &self.owner)
            .field("token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl HostConfig {
    /// Config against the public Gitee endpoints.
    pub fn new(token: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            web_base: DEFAULT_WEB_BASE.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            token: token.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_web_base(mut self, web_base: &str) -> Self {
        self.web_base = web_base.trim_end_matches('/').to_string();
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("GITEE_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("GITEE_TOKEN".into()))?;
        Ok(Self::new(&token)
            .with_owner(&env_or("GITEE_OWNER", DEFAULT_OWNER))
            .with_api_base(&env_or("GITEE_API", DEFAULT_API_BASE))
            .with_web_base(&env_or("GITEE_WEB", DEFAULT_WEB_BASE))
            .with_timeout(env_parse("GITEE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS)))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Everything the engine needs apart from the store connection.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub host: HostConfig,
    pub retry: RetryPolicy,
    /// Scratch directory for spec checkouts
    pub workspace: PathBuf,
    /// JSON dependents table replacing `dnf repoquery`
    pub dependents_file: Option<PathBuf>,
    /// `--setopt=reposdir=` for `dnf repoquery`
    pub dnf_reposdir: Option<PathBuf>,
    /// Use repository names as package names instead of fetching spec files
    pub skip_spec: bool,
}

impl LinkConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: HostConfig::from_env()?,
            retry: RetryPolicy::from_env()?,
            workspace: PathBuf::from(env_or("LINKPULL_WORKSPACE", DEFAULT_WORKSPACE)),
            dependents_file: env_parse::<PathBuf>("LINKPULL_DEPENDENTS_FILE")?,
            dnf_reposdir: env_parse::<PathBuf>("LINKPULL_DNF_REPOSDIR")?,
            skip_spec: env_parse::<bool>("LINKPULL_SKIP_SPEC")?.unwrap_or(false),
        })
    }
}
