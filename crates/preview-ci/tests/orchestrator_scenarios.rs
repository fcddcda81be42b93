//! Scenario tests for the verification orchestrator.
//!
//! Every collaborator is an in-memory fake that records its calls, so
//! each test can assert on both the job outcome and the exact sequence of
//! side effects:
//! - Status ordering (pending first, exactly one terminal status)
//! - Fan-out failures and cancellation
//! - Sink partial rejection, outage and timeout
//!
//! # Tiger Style
//!
//! - No network or processes; fakes answer immediately or on cancellation
//! - Time-dependent tests run with paused time

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use preview_ci::BulkSink;
use preview_ci::ChangedFiles;
use preview_ci::CommitState;
use preview_ci::EnvironmentDeployer;
use preview_ci::HostDiscovery;
use preview_ci::JobCollaborators;
use preview_ci::JobState;
use preview_ci::OrchestratorConfig;
use preview_ci::PreviewCompiler;
use preview_ci::PreviewError;
use preview_ci::RejectedDocument;
use preview_ci::Result;
use preview_ci::SinkDocument;
use preview_ci::StatusReporter;
use preview_ci::StatusUpdate;
use preview_ci::SubmitOutcome;
use preview_ci::VerificationJob;
use preview_ci::VerificationOrchestrator;
use preview_core::CompilationReport;
use preview_core::IndexTemplate;
use preview_core::PullRequestPayload;
use preview_core::RecordKind;
use serde_json::Value;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// =============================================================================
// Fakes
// =============================================================================

type Log = Arc<Mutex<Vec<String>>>;

fn collaborator_error(collaborator: &'static str) -> PreviewError {
    PreviewError::Collaborator {
        collaborator,
        reason: "injected failure".to_string(),
    }
}

struct FakeStatus {
    log: Log,
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
    fail_on: Vec<CommitState>,
}

#[async_trait]
impl StatusReporter for FakeStatus {
    async fn update_status(&self, update: &StatusUpdate) -> Result<()> {
        self.log.lock().unwrap().push(format!("status:{}", update.state));
        self.updates.lock().unwrap().push(update.clone());
        if self.fail_on.contains(&update.state) {
            return Err(collaborator_error("github"));
        }
        Ok(())
    }
}

struct FakeFiles {
    log: Log,
    files: Vec<String>,
    fail: bool,
}

#[async_trait]
impl ChangedFiles for FakeFiles {
    async fn list_changed_files(&self) -> Result<Vec<String>> {
        self.log.lock().unwrap().push("files".to_string());
        if self.fail {
            return Err(collaborator_error("github"));
        }
        Ok(self.files.clone())
    }
}

struct FakeHosts {
    log: Log,
    hosts: Vec<String>,
    fail: bool,
}

#[async_trait]
impl HostDiscovery for FakeHosts {
    async fn resolve_hosts(&self, paths: &[String]) -> Result<Vec<String>> {
        self.log.lock().unwrap().push(format!("hosts:{}", paths.join(",")));
        if self.fail {
            return Err(collaborator_error("puppetdb"));
        }
        Ok(self.hosts.clone())
    }
}

struct FakeDeployer {
    log: Log,
    fail_environment: Option<String>,
    cancel_on_deploy: Option<CancellationToken>,
    wait_for_cancel: bool,
}

#[async_trait]
impl EnvironmentDeployer for FakeDeployer {
    async fn deploy(&self, git_ref: &str, environment: &str, repository: &str, cancel: &CancellationToken) -> Result<()> {
        self.log.lock().unwrap().push(format!("deploy:{git_ref}:{environment}:{repository}"));
        if let Some(trigger) = &self.cancel_on_deploy {
            trigger.cancel();
        }
        if self.wait_for_cancel {
            cancel.cancelled().await;
            return Err(PreviewError::Cancelled);
        }
        if self.fail_environment.as_deref() == Some(environment) {
            return Err(PreviewError::ProcessFailed {
                program: "deploy".to_string(),
                exit_code: 1,
                stderr: "no such branch".to_string(),
            });
        }
        Ok(())
    }
}

enum CompileMode {
    Report(Value),
    Fail,
    WaitForCancel,
}

struct FakeCompiler {
    log: Log,
    mode: CompileMode,
}

#[async_trait]
impl PreviewCompiler for FakeCompiler {
    async fn preview(
        &self,
        hosts: &[String],
        baseline_environment: &str,
        candidate_environment: &str,
        cancel: &CancellationToken,
    ) -> Result<CompilationReport> {
        self.log
            .lock()
            .unwrap()
            .push(format!("compile:{}:{baseline_environment}:{candidate_environment}", hosts.join(",")));
        match &self.mode {
            CompileMode::Report(report) => Ok(serde_json::from_value(report.clone()).unwrap()),
            CompileMode::Fail => Err(PreviewError::ProcessFailed {
                program: "puppet".to_string(),
                exit_code: 2,
                stderr: "catalog compilation exploded".to_string(),
            }),
            CompileMode::WaitForCancel => {
                cancel.cancelled().await;
                Err(PreviewError::Cancelled)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum SinkMode {
    Accept,
    RejectFirst,
    Unavailable,
    Hang,
}

struct FakeSink {
    log: Log,
    submitted: Arc<Mutex<Vec<(String, Vec<SinkDocument>)>>>,
    mode: SinkMode,
}

#[async_trait]
impl BulkSink for FakeSink {
    async fn submit(&self, index: &str, documents: &[SinkDocument]) -> Result<SubmitOutcome> {
        self.log.lock().unwrap().push(format!("submit:{index}:{}", documents.len()));
        self.submitted.lock().unwrap().push((index.to_string(), documents.to_vec()));
        match self.mode {
            SinkMode::Accept => Ok(SubmitOutcome {
                accepted: documents.len(),
                rejected: Vec::new(),
            }),
            SinkMode::RejectFirst => Ok(SubmitOutcome {
                accepted: documents.len() - 1,
                rejected: vec![RejectedDocument {
                    status: 409,
                    error: json!({"type": "version_conflict_engine_exception"}),
                    data: Some(documents[0].body.clone()),
                }],
            }),
            SinkMode::Unavailable => Err(PreviewError::SinkUnavailable {
                reason: "connection refused".to_string(),
            }),
            SinkMode::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Scenario builder
// =============================================================================

struct Scenario {
    log: Log,
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
    submitted: Arc<Mutex<Vec<(String, Vec<SinkDocument>)>>>,
    status_fail_on: Vec<CommitState>,
    files: Vec<String>,
    files_fail: bool,
    hosts: Vec<String>,
    hosts_fail: bool,
    deploy_fail_environment: Option<String>,
    cancel_on_deploy: Option<CancellationToken>,
    deploy_waits_for_cancel: bool,
    compile: CompileMode,
    sink: SinkMode,
}

impl Scenario {
    fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            updates: Arc::new(Mutex::new(Vec::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            status_fail_on: Vec::new(),
            files: vec!["site/profile/manifests/base.pp".to_string(), "README.md".to_string()],
            files_fail: false,
            hosts: vec!["web01".to_string(), "web02".to_string()],
            hosts_fail: false,
            deploy_fail_environment: None,
            cancel_on_deploy: None,
            deploy_waits_for_cancel: false,
            compile: CompileMode::Report(clean_report()),
            sink: SinkMode::Accept,
        }
    }

    fn collaborators(&mut self) -> JobCollaborators {
        let compile = std::mem::replace(&mut self.compile, CompileMode::Fail);
        JobCollaborators {
            status: Arc::new(FakeStatus {
                log: Arc::clone(&self.log),
                updates: Arc::clone(&self.updates),
                fail_on: self.status_fail_on.clone(),
            }),
            files: Arc::new(FakeFiles {
                log: Arc::clone(&self.log),
                files: self.files.clone(),
                fail: self.files_fail,
            }),
            hosts: Arc::new(FakeHosts {
                log: Arc::clone(&self.log),
                hosts: self.hosts.clone(),
                fail: self.hosts_fail,
            }),
            deployer: Arc::new(FakeDeployer {
                log: Arc::clone(&self.log),
                fail_environment: self.deploy_fail_environment.clone(),
                cancel_on_deploy: self.cancel_on_deploy.clone(),
                wait_for_cancel: self.deploy_waits_for_cancel,
            }),
            compiler: Arc::new(FakeCompiler {
                log: Arc::clone(&self.log),
                mode: compile,
            }),
            sink: Arc::new(FakeSink {
                log: Arc::clone(&self.log),
                submitted: Arc::clone(&self.submitted),
                mode: self.sink,
            }),
        }
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<preview_ci::JobOutcome> {
        let config = OrchestratorConfig::new(IndexTemplate::parse("preview-gate-{year}.{month:02d}").unwrap())
            .with_target_url(Some("https://kibana.example.com/?q={message_id}".to_string()));
        VerificationOrchestrator::new(self.collaborators(), Arc::new(config)).run(&job(), cancel).await
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }

    fn states(&self) -> Vec<CommitState> {
        self.updates.lock().unwrap().iter().map(|u| u.state).collect()
    }

    fn last_update(&self) -> StatusUpdate {
        self.updates.lock().unwrap().last().cloned().unwrap()
    }
}

fn job() -> VerificationJob {
    let payload = PullRequestPayload::from_value(&json!({
        "action": "synchronize",
        "number": 42,
        "pull_request": {
            "head": {"ref": "feature/ntp", "sha": "0123abc"},
            "base": {"ref": "production", "sha": "fedc987"},
            "updated_at": "2024-03-05T10:00:00Z"
        },
        "repository": {
            "id": 7,
            "full_name": "ops/puppet",
            "ssh_url": "git@github.com:ops/puppet.git"
        }
    }))
    .unwrap();
    VerificationJob {
        message_id: Uuid::from_u128(0xfeed),
        payload,
        received_at: chrono::Utc::now(),
    }
}

fn clean_report() -> Value {
    json!({
        "stats": {"node_count": 2, "equal": {"total": 2, "percent": 100.0}},
        "all_nodes": [
            {"name": "web01", "error_count": 0},
            {"name": "web02", "error_count": 0}
        ]
    })
}

fn failing_report() -> Value {
    json!({
        "stats": {"node_count": 2},
        "all_nodes": [
            {"name": "web01", "error_count": 0},
            {"name": "web02", "error_count": 1}
        ],
        "preview": {
            "compilation_errors": [{
                "manifest": "site/profile/manifests/base.pp",
                "nodes": ["web02"],
                "errors": [{"message": "Unknown variable $ntp_servers on node web02", "line": 12}]
            }]
        }
    })
}

// =============================================================================
// Verdicts
// =============================================================================

#[tokio::test]
async fn test_clean_compile_succeeds() {
    let mut scenario = Scenario::new();
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Succeeded);
    assert_eq!(outcome.node_count, 2);
    assert_eq!(outcome.failure_count, 0);
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Success]);

    let last = scenario.last_update();
    assert_eq!(last.description, "All 2 affected nodes compiled successfully");
    assert_eq!(
        last.target_url.as_deref(),
        Some("https://kibana.example.com/?q=00000000-0000-0000-0000-00000000feed")
    );
}

#[tokio::test]
async fn test_compile_errors_fail_the_pull_request() {
    let mut scenario = Scenario::new();
    scenario.compile = CompileMode::Report(failing_report());
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(outcome.failure_count, 1);
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Failure]);
    assert_eq!(scenario.last_update().description, "1 of 2 affected nodes failed to compile");
}

#[tokio::test]
async fn test_pending_status_precedes_all_work() {
    let mut scenario = Scenario::new();
    scenario.run(&CancellationToken::new()).await.unwrap();

    let calls = scenario.calls();
    assert_eq!(calls.first().map(String::as_str), Some("status:pending"));
    assert_eq!(calls.last().map(String::as_str), Some("status:success"));
}

#[tokio::test]
async fn test_no_affected_hosts_succeeds_without_compiling() {
    let mut scenario = Scenario::new();
    scenario.hosts = Vec::new();
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Succeeded);
    assert_eq!(outcome.node_count, 0);
    assert!(scenario.calls_starting_with("compile").is_empty());
    assert!(scenario.calls_starting_with("submit").is_empty());
    assert_eq!(scenario.last_update().description, "No nodes affected by this change");
}

// =============================================================================
// Fan-out
// =============================================================================

#[tokio::test]
async fn test_deploys_candidate_and_baseline() {
    let mut scenario = Scenario::new();
    scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(scenario.calls_starting_with("deploy"), vec![
        "deploy:feature/ntp:pr_42:git@github.com:ops/puppet.git",
        "deploy:production:production:git@github.com:ops/puppet.git",
    ]);
    assert_eq!(scenario.calls_starting_with("hosts"), vec![
        "hosts:site/profile/manifests/base.pp,README.md"
    ]);
    assert_eq!(scenario.calls_starting_with("compile"), vec!["compile:web01,web02:production:pr_42"]);
}

#[tokio::test]
async fn test_deploy_failure_errors_once() {
    let mut scenario = Scenario::new();
    scenario.deploy_fail_environment = Some("pr_42".to_string());
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PreviewError::ProcessFailed { .. }));
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Error]);
    assert!(scenario.calls_starting_with("compile").is_empty());
    assert!(scenario.calls_starting_with("submit").is_empty());
    // Discovery still ran to completion alongside the deployment.
    assert_eq!(scenario.calls_starting_with("hosts").len(), 1);
}

#[tokio::test]
async fn test_discovery_failure_errors() {
    let mut scenario = Scenario::new();
    scenario.hosts_fail = true;
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PreviewError::Collaborator { collaborator: "puppetdb", .. }));
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Error]);
    assert!(scenario.calls_starting_with("compile").is_empty());
}

#[tokio::test]
async fn test_file_listing_failure_skips_host_discovery() {
    let mut scenario = Scenario::new();
    scenario.files_fail = true;
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(err.is_collaborator_failure());
    assert!(scenario.calls_starting_with("hosts").is_empty());
    assert_eq!(scenario.calls_starting_with("deploy").len(), 2);
}

#[tokio::test]
async fn test_cancellation_during_fan_out() {
    let cancel = CancellationToken::new();
    let mut scenario = Scenario::new();
    scenario.cancel_on_deploy = Some(cancel.clone());
    let err = scenario.run(&cancel).await.unwrap_err();

    assert!(matches!(err, PreviewError::Cancelled));
    assert!(scenario.calls_starting_with("compile").is_empty());
    assert_eq!(scenario.states().last(), Some(&CommitState::Error));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_slow_deploy() {
    let cancel = CancellationToken::new();
    let mut scenario = Scenario::new();
    scenario.deploy_waits_for_cancel = true;

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let err = scenario.run(&cancel).await.unwrap_err();
    assert!(matches!(err, PreviewError::Cancelled));
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Error]);
    // The baseline deploy never starts once the candidate deploy is aborted.
    assert_eq!(scenario.calls_starting_with("deploy"), vec![
        "deploy:feature/ntp:pr_42:git@github.com:ops/puppet.git"
    ]);
    assert!(scenario.calls_starting_with("compile").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_compile() {
    let cancel = CancellationToken::new();
    let mut scenario = Scenario::new();
    scenario.compile = CompileMode::WaitForCancel;

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let err = scenario.run(&cancel).await.unwrap_err();
    assert!(matches!(err, PreviewError::Cancelled));
    assert!(scenario.calls_starting_with("submit").is_empty());
}

#[tokio::test]
async fn test_compiler_failure_errors() {
    let mut scenario = Scenario::new();
    scenario.compile = CompileMode::Fail;
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PreviewError::ProcessFailed { exit_code: 2, .. }));
    let last = scenario.last_update();
    assert_eq!(last.state, CommitState::Error);
    assert_eq!(last.description, "Verification could not complete: puppet exited with code 2");
}

// =============================================================================
// Sink
// =============================================================================

#[tokio::test]
async fn test_submission_uses_rendered_index_and_record_order() {
    let mut scenario = Scenario::new();
    scenario.compile = CompileMode::Report(failing_report());
    scenario.run(&CancellationToken::new()).await.unwrap();

    let submitted = scenario.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    let (index, documents) = &submitted[0];
    assert_eq!(index, "preview-gate-2024.03");

    let kinds: Vec<RecordKind> = documents.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![RecordKind::Summary, RecordKind::Node, RecordKind::Node, RecordKind::Error]);
    for document in documents {
        assert_eq!(document.body["message_id"], "00000000-0000-0000-0000-00000000feed");
        assert_eq!(document.body["pull_request"], 42);
    }
}

#[tokio::test]
async fn test_partial_rejection_keeps_verdict() {
    let mut scenario = Scenario::new();
    scenario.sink = SinkMode::RejectFirst;
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Succeeded);
    assert_eq!(outcome.rejected_documents, 1);
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Success]);
}

#[tokio::test]
async fn test_sink_outage_errors() {
    let mut scenario = Scenario::new();
    scenario.sink = SinkMode::Unavailable;
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PreviewError::SinkUnavailable { .. }));
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Error]);
}

#[tokio::test(start_paused = true)]
async fn test_sink_timeout_errors() {
    let mut scenario = Scenario::new();
    scenario.sink = SinkMode::Hang;
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PreviewError::SinkTimeout { timeout_secs: 60 }));
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Error]);
}

// =============================================================================
// Status failures
// =============================================================================

#[tokio::test]
async fn test_error_status_failure_is_swallowed() {
    let mut scenario = Scenario::new();
    scenario.deploy_fail_environment = Some("production".to_string());
    scenario.status_fail_on = vec![CommitState::Error];
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    // The original failure is returned, not the status failure.
    assert!(matches!(err, PreviewError::ProcessFailed { .. }));
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Error]);
}

#[tokio::test]
async fn test_pending_status_failure_stops_the_job() {
    let mut scenario = Scenario::new();
    scenario.status_fail_on = vec![CommitState::Pending];
    let err = scenario.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, PreviewError::Collaborator { collaborator: "github", .. }));
    assert!(scenario.calls_starting_with("deploy").is_empty());
    assert!(scenario.calls_starting_with("files").is_empty());
}

#[tokio::test]
async fn test_verdict_status_failure_keeps_success() {
    let mut scenario = Scenario::new();
    scenario.status_fail_on = vec![CommitState::Success];
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Succeeded);
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Success]);
}

#[tokio::test]
async fn test_verdict_status_failure_keeps_failure() {
    let mut scenario = Scenario::new();
    scenario.compile = CompileMode::Report(failing_report());
    scenario.status_fail_on = vec![CommitState::Failure];
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Failure]);
}

#[tokio::test]
async fn test_no_hosts_status_failure_keeps_success() {
    let mut scenario = Scenario::new();
    scenario.hosts = Vec::new();
    scenario.status_fail_on = vec![CommitState::Success];
    let outcome = scenario.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.state, JobState::Succeeded);
    assert_eq!(scenario.states(), vec![CommitState::Pending, CommitState::Success]);
}
