//! Seams between the orchestrator and the outside world.
//!
//! Each external system the verification run talks to is reached through
//! one of these traits. Production implementations live in [`crate::github`],
//! [`crate::puppetdb`], [`crate::process`] and [`crate::elasticsearch`];
//! tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use preview_core::CompilationReport;
use preview_core::PullRequestPayload;
use preview_core::RecordKind;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;

/// State of a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One commit status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: CommitState,
    pub description: String,
    pub target_url: Option<String>,
    /// Job the update belongs to, for log correlation.
    pub job_id: Uuid,
}

/// Reports verification state back to the pull request.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Publish a status on the pull request's head commit.
    async fn update_status(&self, update: &StatusUpdate) -> Result<()>;
}

/// Lists the files touched by the pull request.
#[async_trait]
pub trait ChangedFiles: Send + Sync {
    async fn list_changed_files(&self) -> Result<Vec<String>>;
}

/// Resolves changed files to the hosts whose catalogs use them.
#[async_trait]
pub trait HostDiscovery: Send + Sync {
    /// Hosts affected by `paths`. Only manifests are considered.
    async fn resolve_hosts(&self, paths: &[String]) -> Result<Vec<String>>;
}

/// Deploys a git ref into a named environment.
#[async_trait]
pub trait EnvironmentDeployer: Send + Sync {
    /// Deploy `git_ref` of `repository` as `environment`.
    ///
    /// Implementations abort the deployment and return
    /// [`crate::PreviewError::Cancelled`] once `cancel` fires.
    async fn deploy(&self, git_ref: &str, environment: &str, repository: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Runs a preview compilation.
#[async_trait]
pub trait PreviewCompiler: Send + Sync {
    /// Compile `hosts` against both environments.
    ///
    /// Implementations stop work and return
    /// [`crate::PreviewError::Cancelled`] once `cancel` fires.
    async fn preview(
        &self,
        hosts: &[String],
        baseline_environment: &str,
        candidate_environment: &str,
        cancel: &CancellationToken,
    ) -> Result<CompilationReport>;
}

/// A record encoded for the bulk sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkDocument {
    pub kind: RecordKind,
    pub body: serde_json::Value,
}

/// A document the sink refused.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedDocument {
    /// HTTP-style status for the item.
    pub status: u16,
    /// Error reported by the sink.
    pub error: serde_json::Value,
    /// The refused document, when the sink echoes it.
    pub data: Option<serde_json::Value>,
}

/// Outcome of a bulk submission the sink accepted as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOutcome {
    pub accepted: usize,
    pub rejected: Vec<RejectedDocument>,
}

/// Batch document indexing.
#[async_trait]
pub trait BulkSink: Send + Sync {
    /// Submit documents to `index`.
    ///
    /// Per-document rejections are reported in the outcome. Connection
    /// failures and whole-batch refusals are errors.
    async fn submit(&self, index: &str, documents: &[SinkDocument]) -> Result<SubmitOutcome>;
}

/// The collaborators bound to one pull request.
#[derive(Clone)]
pub struct JobCollaborators {
    pub status: Arc<dyn StatusReporter>,
    pub files: Arc<dyn ChangedFiles>,
    pub hosts: Arc<dyn HostDiscovery>,
    pub deployer: Arc<dyn EnvironmentDeployer>,
    pub compiler: Arc<dyn PreviewCompiler>,
    pub sink: Arc<dyn BulkSink>,
}

/// Builds the collaborators for a pull request.
///
/// Status and file listing are scoped to one pull request, so the set is
/// built per job.
pub trait CollaboratorFactory: Send + Sync {
    fn for_pull_request(&self, payload: &PullRequestPayload) -> JobCollaborators;
}
