//! Gitee REST v5 client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkpull_state::PullRef;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{HostError, HostResult, PullInfo, PullState, RepoHost};
use crate::config::HostConfig;
use crate::pull::pull_url;
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
struct GiteeLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GiteePull {
    #[serde(default)]
    state: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    labels: Vec<GiteeLabel>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GiteeComment {
    id: u64,
}

/// Gitee client. Transient failures are retried with the configured policy.
pub struct GiteeClient {
    config: HostConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl GiteeClient {
    pub fn new(config: HostConfig, retry: RetryPolicy) -> HostResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("linkpull/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HostError::Config(e.to_string()))?;
        Ok(Self {
            config,
            http,
            retry,
        })
    }

    /// `<api_base>/<owner>/<repo>/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, repo: &str, segments: &[&str]) -> HostResult<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| HostError::Config(format!("{}: {e}", self.config.api_base)))?;
        url.path_segments_mut()
            .map_err(|_| HostError::Config(format!("{} cannot be a base URL", self.config.api_base)))?
            .pop_if_empty()
            .push(&self.config.owner)
            .push(repo)
            .extend(segments);
        Ok(url)
    }

    /// Send a request built fresh for every attempt.
    async fn execute<F>(&self, operation: &str, build: F) -> HostResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let build = &build;
        self.retry
            .run(operation, move || async move {
                let response = build().send().await?;
                let status = response.status();
                debug!(operation, status = status.as_u16(), "host response");
                if status == StatusCode::NOT_FOUND {
                    return Err(HostError::NotFound(response.url().path().to_string()));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(HostError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(response)
            })
            .await
            .map_err(|failure| failure.error)
    }

    fn request(&self, method: Method, url: &Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url.clone())
            .query(&[("access_token", self.config.token.as_str())])
    }
}

#[async_trait]
impl RepoHost for GiteeClient {
    async fn get_pull(&self, pull: &PullRef) -> HostResult<PullInfo> {
        let number = pull.number.to_string();
        let url = self.endpoint(&pull.repo, &["pulls", &number])?;
        let response = self
            .execute("get pull", || self.request(Method::GET, &url))
            .await?;
        let raw: GiteePull = response
            .json()
            .await
            .map_err(|e| HostError::Decode(e.to_string()))?;
        Ok(PullInfo {
            pull: pull.clone(),
            state: PullState::parse(&raw.state),
            title: raw.title,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            created_at: raw.created_at,
        })
    }

    async fn add_label(&self, pull: &PullRef, label: &str) -> HostResult<()> {
        let number = pull.number.to_string();
        let url = self.endpoint(&pull.repo, &["pulls", &number, "labels"])?;
        let body = [label];
        self.execute("add label", || self.request(Method::POST, &url).json(&body))
            .await?;
        Ok(())
    }

    async fn remove_label(&self, pull: &PullRef, label: &str) -> HostResult<()> {
        let number = pull.number.to_string();
        let url = self.endpoint(&pull.repo, &["pulls", &number, "labels", label])?;
        self.execute("remove label", || self.request(Method::DELETE, &url))
            .await?;
        Ok(())
    }

    async fn list_labels(&self, pull: &PullRef, page: u32, per_page: u32) -> HostResult<Vec<String>> {
        let number = pull.number.to_string();
        let url = self.endpoint(&pull.repo, &["pulls", &number, "labels"])?;
        let response = self
            .execute("list labels", || {
                self.request(Method::GET, &url)
                    .query(&[("page", page), ("per_page", per_page)])
            })
            .await?;
        let labels: Vec<GiteeLabel> = response
            .json()
            .await
            .map_err(|e| HostError::Decode(e.to_string()))?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn create_comment(&self, pull: &PullRef, body: &str) -> HostResult<u64> {
        let number = pull.number.to_string();
        let url = self.endpoint(&pull.repo, &["pulls", &number, "comments"])?;
        let response = self
            .execute("create comment", || {
                self.request(Method::POST, &url).form(&[("body", body)])
            })
            .await?;
        let comment: GiteeComment = response
            .json()
            .await
            .map_err(|e| HostError::Decode(e.to_string()))?;
        Ok(comment.id)
    }

    async fn edit_comment(&self, repo: &str, comment_id: u64, body: &str) -> HostResult<()> {
        let id = comment_id.to_string();
        let url = self.endpoint(repo, &["pulls", "comments", &id])?;
        self.execute("edit comment", || {
            self.request(Method::PATCH, &url).form(&[("body", body)])
        })
        .await?;
        Ok(())
    }

    fn pull_url(&self, pull: &PullRef) -> String {
        pull_url(&self.config.web_base, &self.config.owner, pull)
    }
}
