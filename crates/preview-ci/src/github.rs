//! GitHub REST v3 collaborators.
//!
//! Commit statuses are set on the pull request's head commit and the
//! changed file list is read from the pull request files endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;

use crate::collaborators::ChangedFiles;
use crate::collaborators::StatusReporter;
use crate::collaborators::StatusUpdate;
use crate::constants::CHANGED_FILES_PAGE_SIZE;
use crate::constants::MAX_CHANGED_FILES_PAGES;
use crate::constants::USER_AGENT;
use crate::error::HttpSnafu;
use crate::error::PreviewError;
use crate::error::Result;

const COLLABORATOR: &str = "github";

/// Shared GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    auth_token: Option<String>,
    status_context: String,
}

impl GitHubClient {
    /// Create a client for `api_url` (e.g. `https://api.github.com`).
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        auth_token: Option<String>,
        status_context: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context(HttpSnafu { collaborator: COLLABORATOR })?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|t| !t.is_empty()),
            status_context: status_context.into(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url).header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match &self.auth_token {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, format!("token {token}")),
            None => builder,
        }
    }

    /// Status reporter bound to one commit.
    pub fn status_reporter(&self, repository: &str, sha: &str) -> CommitStatusReporter {
        CommitStatusReporter {
            client: self.clone(),
            url: status_url(&self.api_url, repository, sha),
        }
    }

    /// File lister bound to one pull request.
    pub fn changed_files(&self, repository: &str, number: u64) -> PullRequestFiles {
        PullRequestFiles {
            client: self.clone(),
            url: files_url(&self.api_url, repository, number),
        }
    }
}

/// `POST` target for a commit status.
pub fn status_url(api_url: &str, repository: &str, sha: &str) -> String {
    format!("{api_url}/repos/{repository}/statuses/{sha}")
}

/// `GET` target for a pull request's files, without paging parameters.
pub fn files_url(api_url: &str, repository: &str, number: u64) -> String {
    format!("{api_url}/repos/{repository}/pulls/{number}/files")
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
    context: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PreviewError::Collaborator {
        collaborator: COLLABORATOR,
        reason: format!("{action} returned {status}: {}", body.chars().take(512).collect::<String>()),
    })
}

/// Sets statuses on one commit.
#[derive(Debug, Clone)]
pub struct CommitStatusReporter {
    client: GitHubClient,
    url: String,
}

#[async_trait]
impl StatusReporter for CommitStatusReporter {
    async fn update_status(&self, update: &StatusUpdate) -> Result<()> {
        let body = StatusBody {
            state: update.state.as_str(),
            description: &update.description,
            target_url: update.target_url.as_deref(),
            context: &self.client.status_context,
        };
        info!(message_id = %update.job_id, state = %update.state, url = %self.url, "posting commit status");

        let response = self
            .client
            .request(reqwest::Method::POST, &self.url)
            .json(&body)
            .send()
            .await
            .context(HttpSnafu { collaborator: COLLABORATOR })?;
        check_status(response, "status update").await?;
        Ok(())
    }
}

/// Lists the files of one pull request.
#[derive(Debug, Clone)]
pub struct PullRequestFiles {
    client: GitHubClient,
    url: String,
}

#[async_trait]
impl ChangedFiles for PullRequestFiles {
    async fn list_changed_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for page in 1..=MAX_CHANGED_FILES_PAGES {
            let response = self
                .client
                .request(reqwest::Method::GET, &self.url)
                .query(&[("per_page", CHANGED_FILES_PAGE_SIZE), ("page", page)])
                .send()
                .await
                .context(HttpSnafu { collaborator: COLLABORATOR })?;
            let batch: Vec<PullRequestFile> = check_status(response, "file listing")
                .await?
                .json()
                .await
                .context(HttpSnafu { collaborator: COLLABORATOR })?;

            let last_page = batch.len() < CHANGED_FILES_PAGE_SIZE;
            files.extend(batch.into_iter().map(|f| f.filename));
            if last_page {
                break;
            }
        }
        debug!(url = %self.url, count = files.len(), "listed pull request files");
        Ok(files)
    }
}
