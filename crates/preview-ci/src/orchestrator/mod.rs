//! Verification orchestrator.
//!
//! Drives one pull request through pending status, concurrent host
//! discovery and environment deployment, preview compilation,
//! normalization, bulk submission and a terminal status. Any failure ends
//! the job in [`JobState::Errored`] with a best-effort `error` status, and
//! the failure is returned to the caller.
//!
//! Only the `pending` status update is critical. A failed `success` or
//! `failure` update is logged and the verdict stands.

mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use preview_core::IndexTemplate;
use preview_core::JobContext;
use preview_core::NormalizedReport;
use preview_core::PullRequestPayload;
use preview_core::normalize;
use preview_core::verified::NO_AFFECTED_NODES_DESCRIPTION;
use preview_core::verified::PENDING_DESCRIPTION;
use preview_core::verified::candidate_environment_name;
use preview_core::verified::error_description;
use preview_core::verified::failure_description;
use preview_core::verified::render_target_url;
use preview_core::verified::sanitize_environment_name;
use preview_core::verified::success_description;
use preview_core::verified::truncate_description;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

pub use self::state::JobState;
use crate::collaborators::CommitState;
use crate::collaborators::JobCollaborators;
use crate::collaborators::SinkDocument;
use crate::collaborators::StatusUpdate;
use crate::collaborators::SubmitOutcome;
use crate::constants::SINK_SUBMIT_TIMEOUT;
use crate::error::CancelledSnafu;
use crate::error::InvalidTransitionSnafu;
use crate::error::NormalizeSnafu;
use crate::error::PreviewError;
use crate::error::Result;
use crate::error::SinkTimeoutSnafu;

/// Settings shared by every verification run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Template for the sink index name.
    pub index: IndexTemplate,
    /// Status link template with an optional `{message_id}` placeholder.
    pub target_url: Option<String>,
    /// Deadline for the bulk submission.
    pub submit_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new(index: IndexTemplate) -> Self {
        Self {
            index,
            target_url: None,
            submit_timeout: SINK_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_target_url(mut self, target_url: Option<String>) -> Self {
        self.target_url = target_url;
        self
    }
}

/// One pull request to verify.
#[derive(Debug, Clone)]
pub struct VerificationJob {
    /// Event identifier, stamped onto every record.
    pub message_id: Uuid,
    pub payload: PullRequestPayload,
    /// When the event was received; the index time when the pull request
    /// carries no `updated_at`.
    pub received_at: DateTime<Utc>,
}

impl VerificationJob {
    /// The stamped identity of this job.
    pub fn context(&self) -> JobContext {
        JobContext {
            message_id: self.message_id,
            pull_request: self.payload.number,
            base_environment: self.payload.base_ref().to_string(),
            repository: self.payload.repository.ssh_url.clone(),
            timestamp: self.payload.pull_request.updated_at.unwrap_or(self.received_at),
        }
    }
}

/// How a completed job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Terminal state, `Succeeded` or `Failed`.
    pub state: JobState,
    /// Hosts compiled.
    pub node_count: u64,
    /// Hosts with compilation errors.
    pub failure_count: u64,
    /// Documents the sink refused.
    pub rejected_documents: usize,
}

/// Tracks the job state and refuses illegal transitions.
#[derive(Debug)]
struct StateTracker {
    message_id: Uuid,
    state: JobState,
}

impl StateTracker {
    fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            state: JobState::Created,
        }
    }

    fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return InvalidTransitionSnafu {
                from: self.state.as_str(),
                to: next.as_str(),
            }
            .fail();
        }
        debug!(message_id = %self.message_id, from = %self.state, to = %next, "job state transition");
        self.state = next;
        Ok(())
    }

    /// Move to [`JobState::Errored`] unless a terminal state was reached.
    fn fail(&mut self) {
        if self.state.is_terminal() {
            debug!(message_id = %self.message_id, state = %self.state, "job already terminal, not marking errored");
            return;
        }
        debug!(message_id = %self.message_id, from = %self.state, to = %JobState::Errored, "job state transition");
        self.state = JobState::Errored;
    }
}

/// Runs verification jobs against one set of collaborators.
pub struct VerificationOrchestrator {
    collaborators: JobCollaborators,
    config: Arc<OrchestratorConfig>,
}

impl VerificationOrchestrator {
    pub fn new(collaborators: JobCollaborators, config: Arc<OrchestratorConfig>) -> Self {
        Self { collaborators, config }
    }

    /// Run a job to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the error that moved the job to [`JobState::Errored`], after
    /// an `error` status has been attempted.
    pub async fn run(&self, job: &VerificationJob, cancel: &CancellationToken) -> Result<JobOutcome> {
        let mut tracker = StateTracker::new(job.message_id);

        match self.execute(job, &mut tracker, cancel).await {
            Ok(outcome) => {
                info!(
                    message_id = %job.message_id,
                    pull_request = job.payload.number,
                    state = %outcome.state,
                    node_count = outcome.node_count,
                    failure_count = outcome.failure_count,
                    "verification finished"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    message_id = %job.message_id,
                    pull_request = job.payload.number,
                    stage = %tracker.state,
                    error = %err,
                    "verification errored"
                );
                self.report_error(job, &err).await;
                tracker.fail();
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        job: &VerificationJob,
        tracker: &mut StateTracker,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome> {
        let payload = &job.payload;
        let ctx = job.context();

        self.publish(job, CommitState::Pending, PENDING_DESCRIPTION).await?;
        tracker.advance(JobState::Pending)?;

        tracker.advance(JobState::DiscoveringAndDeploying)?;
        let baseline = sanitize_environment_name(payload.base_ref());
        let candidate = candidate_environment_name(payload.number);
        let hosts = self.discover_and_deploy(job, &baseline, &candidate, cancel).await;
        if cancel.is_cancelled() {
            return CancelledSnafu.fail();
        }
        let hosts = hosts?;

        if hosts.is_empty() {
            info!(message_id = %job.message_id, "no nodes affected, skipping compilation");
            self.publish_verdict(job, CommitState::Success, NO_AFFECTED_NODES_DESCRIPTION).await;
            tracker.advance(JobState::Succeeded)?;
            return Ok(JobOutcome {
                state: JobState::Succeeded,
                node_count: 0,
                failure_count: 0,
                rejected_documents: 0,
            });
        }

        tracker.advance(JobState::Compiling)?;
        info!(
            message_id = %job.message_id,
            host_count = hosts.len(),
            baseline = %baseline,
            candidate = %candidate,
            "compiling preview"
        );
        let report = self.collaborators.compiler.preview(&hosts, &baseline, &candidate, cancel).await?;

        tracker.advance(JobState::Normalizing)?;
        let normalized = normalize(&report, &ctx).context(NormalizeSnafu)?;

        tracker.advance(JobState::Submitting)?;
        let submitted = self.submit(job, &ctx, &normalized).await?;

        let node_count = normalized.nodes.len() as u64;
        let failure_count = normalized.summary.record.failure_count;
        let (state, commit_state, description) = if normalized.all_hosts_succeeded() {
            (JobState::Succeeded, CommitState::Success, success_description(node_count))
        } else {
            (JobState::Failed, CommitState::Failure, failure_description(failure_count, node_count))
        };
        self.publish_verdict(job, commit_state, &description).await;
        tracker.advance(state)?;

        Ok(JobOutcome {
            state,
            node_count,
            failure_count,
            rejected_documents: submitted.rejected.len(),
        })
    }

    /// Run host discovery and both deployments concurrently, waiting for both.
    async fn discover_and_deploy(
        &self,
        job: &VerificationJob,
        baseline: &str,
        candidate: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let payload = &job.payload;
        let repository = payload.repository.ssh_url.as_str();

        let discover = async {
            let files = self.collaborators.files.list_changed_files().await?;
            debug!(message_id = %job.message_id, file_count = files.len(), "listed changed files");
            self.collaborators.hosts.resolve_hosts(&files).await
        };
        let deploy = async {
            self.collaborators.deployer.deploy(payload.head_ref(), candidate, repository, cancel).await?;
            self.collaborators.deployer.deploy(payload.base_ref(), baseline, repository, cancel).await
        };

        let (hosts, deployed) = tokio::join!(discover, deploy);
        let hosts = hosts?;
        deployed?;
        debug!(message_id = %job.message_id, host_count = hosts.len(), "discovery and deployment complete");
        Ok(hosts)
    }

    async fn submit(&self, job: &VerificationJob, ctx: &JobContext, normalized: &NormalizedReport) -> Result<SubmitOutcome> {
        let documents: Vec<SinkDocument> = normalized
            .documents()
            .context(NormalizeSnafu)?
            .into_iter()
            .map(|(kind, body)| SinkDocument { kind, body })
            .collect();
        let index = self.config.index.render(&ctx.timestamp);
        info!(message_id = %job.message_id, index = %index, documents = documents.len(), "submitting records");

        let outcome = match tokio::time::timeout(self.config.submit_timeout, self.collaborators.sink.submit(&index, &documents)).await {
            Ok(result) => result?,
            Err(_) => {
                return SinkTimeoutSnafu {
                    timeout_secs: self.config.submit_timeout.as_secs(),
                }
                .fail();
            }
        };

        debug!(message_id = %job.message_id, accepted = outcome.accepted, "records submitted");
        if !outcome.rejected.is_empty() {
            error!(
                message_id = %job.message_id,
                index = %index,
                rejected = outcome.rejected.len(),
                "sink rejected some documents"
            );
            for rejected in &outcome.rejected {
                error!(
                    message_id = %job.message_id,
                    status = rejected.status,
                    error = %rejected.error,
                    data = ?rejected.data,
                    "document rejected"
                );
            }
        }
        Ok(outcome)
    }

    async fn publish(&self, job: &VerificationJob, state: CommitState, description: &str) -> Result<()> {
        info!(
            message_id = %job.message_id,
            pull_request = job.payload.number,
            repository = %job.payload.repository.full_name,
            state = %state,
            "setting commit status"
        );
        let update = StatusUpdate {
            state,
            description: truncate_description(description),
            target_url: render_target_url(self.config.target_url.as_deref(), job.message_id),
            job_id: job.message_id,
        };
        self.collaborators.status.update_status(&update).await
    }

    /// Publish the `success` or `failure` verdict. A reporter failure is
    /// logged and does not change the outcome.
    async fn publish_verdict(&self, job: &VerificationJob, state: CommitState, description: &str) {
        if let Err(status_err) = self.publish(job, state, description).await {
            warn!(
                message_id = %job.message_id,
                state = %state,
                error = %status_err,
                "failed to report verdict status"
            );
        }
    }

    /// Best effort: a failure here is logged and dropped.
    async fn report_error(&self, job: &VerificationJob, err: &PreviewError) {
        let description = error_description(&err.status_reason());
        if let Err(status_err) = self.publish(job, CommitState::Error, &description).await {
            warn!(
                message_id = %job.message_id,
                error = %status_err,
                "failed to report error status"
            );
        }
    }
}
