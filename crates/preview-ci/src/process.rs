//! External process collaborators: environment deployment and preview
//! compilation.
//!
//! Processes run in their own process group so cancellation can stop the
//! whole tree: SIGTERM first, then SIGKILL after a grace period.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;

use async_trait::async_trait;
use preview_core::CompilationReport;
use preview_core::verified::render_deploy_args;
use snafu::ResultExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::collaborators::EnvironmentDeployer;
use crate::collaborators::PreviewCompiler;
use crate::constants::MAX_REPORT_BYTES;
use crate::constants::MAX_STDERR_BYTES;
use crate::constants::PROCESS_GRACE_PERIOD;
use crate::error::CancelledSnafu;
use crate::error::MalformedOutputSnafu;
use crate::error::PreviewError;
use crate::error::ProcessSpawnSnafu;
use crate::error::Result;

/// Read up to `limit` bytes, then discard the rest so the writer never blocks.
async fn read_bounded<R: AsyncRead + Unpin>(pipe: Option<R>, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        (&mut pipe).take(limit as u64).read_to_end(&mut buf).await?;
        tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    }
    Ok(buf)
}

/// Stop a child's process group, escalating to SIGKILL after the grace period.
async fn terminate(child: &mut Child, program: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        if let Some(id) = child.id() {
            warn!(program, pid = id, "cancelling process, sending SIGTERM");
            let _ = killpg(Pid::from_raw(id as i32), Signal::SIGTERM);

            if tokio::time::timeout(PROCESS_GRACE_PERIOD, child.wait()).await.is_err() {
                warn!(program, pid = id, "grace period expired, sending SIGKILL");
                let _ = killpg(Pid::from_raw(id as i32), Signal::SIGKILL);
                let _ = child.wait().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        warn!(program, "cancelling process");
        let _ = child.kill().await;
    }
}

/// Captured result of a process that ran to completion.
struct Finished {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Run `program` until it exits or `cancel` fires.
async fn run_process(program: &str, args: &[String], cancel: &CancellationToken) -> Result<Finished> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group for clean termination.
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(program, args = ?args, "spawning process");
    let mut child = cmd.spawn().context(ProcessSpawnSnafu { program })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = tokio::select! {
        finished = async {
            tokio::join!(
                child.wait(),
                read_bounded(stdout, MAX_REPORT_BYTES),
                read_bounded(stderr, MAX_STDERR_BYTES),
            )
        } => Some(finished),
        _ = cancel.cancelled() => None,
    };

    let Some((status, stdout, stderr)) = finished else {
        terminate(&mut child, program).await;
        return CancelledSnafu.fail();
    };

    Ok(Finished {
        status: status.context(ProcessSpawnSnafu { program })?,
        stdout: stdout.context(ProcessSpawnSnafu { program })?,
        stderr: stderr.context(ProcessSpawnSnafu { program })?,
    })
}

fn require_success(program: &str, finished: &Finished) -> Result<()> {
    if finished.status.success() {
        return Ok(());
    }
    Err(PreviewError::ProcessFailed {
        program: program.to_string(),
        exit_code: finished.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&finished.stderr).trim().to_string(),
    })
}

/// Deploys environments with an external deploy tool.
///
/// Arguments come from a template with `{ref}`, `{environment}` and
/// `{repository}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandDeployer {
    program: String,
    args: Vec<String>,
}

impl CommandDeployer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl EnvironmentDeployer for CommandDeployer {
    async fn deploy(&self, git_ref: &str, environment: &str, repository: &str, cancel: &CancellationToken) -> Result<()> {
        let args = render_deploy_args(&self.args, git_ref, environment, repository);
        info!(git_ref, environment, "deploying environment");
        let finished = run_process(&self.program, &args, cancel).await?;
        require_success(&self.program, &finished)?;
        debug!(environment, "environment deployed");
        Ok(())
    }
}

/// Runs `puppet preview` and decodes its overview report.
#[derive(Debug, Clone)]
pub struct PuppetPreview {
    puppet: String,
    excludes_file: Option<PathBuf>,
}

impl PuppetPreview {
    pub fn new(puppet: impl Into<String>, excludes_file: Option<PathBuf>) -> Self {
        Self {
            puppet: puppet.into(),
            excludes_file,
        }
    }
}

/// Arguments for one preview run.
pub fn preview_args(
    baseline_environment: &str,
    candidate_environment: &str,
    nodes_file: &str,
    excludes_file: Option<&str>,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "preview",
        "--baseline-environment",
        baseline_environment,
        "--preview-environment",
        candidate_environment,
        "--view",
        "overview-json",
        "--nodes",
        nodes_file,
    ]
    .into_iter()
    .map(String::from)
    .collect();
    if let Some(excludes) = excludes_file {
        args.push("--excludes".to_string());
        args.push(excludes.to_string());
    }
    args
}

#[async_trait]
impl PreviewCompiler for PuppetPreview {
    async fn preview(
        &self,
        hosts: &[String],
        baseline_environment: &str,
        candidate_environment: &str,
        cancel: &CancellationToken,
    ) -> Result<CompilationReport> {
        let nodes_file = tempfile::Builder::new()
            .prefix("preview-nodes-")
            .suffix(".txt")
            .tempfile()
            .context(ProcessSpawnSnafu { program: self.puppet.as_str() })?;
        tokio::fs::write(nodes_file.path(), hosts.join("\n"))
            .await
            .context(ProcessSpawnSnafu { program: self.puppet.as_str() })?;

        let nodes_path = nodes_file.path().display().to_string();
        let excludes = self.excludes_file.as_ref().map(|p| p.display().to_string());
        let args = preview_args(baseline_environment, candidate_environment, &nodes_path, excludes.as_deref());

        let finished = run_process(&self.puppet, &args, cancel).await?;
        require_success(&self.puppet, &finished)?;

        let report = CompilationReport::from_slice(&finished.stdout).context(MalformedOutputSnafu {
            program: self.puppet.as_str(),
        })?;
        debug!(nodes = report.all_nodes.len(), "preview report decoded");
        Ok(report)
    }
}
