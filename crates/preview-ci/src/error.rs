//! Error types for verification runs.
//!
//! Uses snafu with source chains preserved. Normalization errors from
//! `preview-core` are wrapped rather than flattened so the original
//! cause stays visible in logs.
//!
//! # Tiger Style
//!
//! - All errors preserve source chains where applicable
//! - Errors include the collaborator or process involved

use preview_core::CoreError;
use snafu::Snafu;

/// Result type for verification operations.
pub type Result<T, E = PreviewError> = std::result::Result<T, E>;

/// Errors that end a verification run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PreviewError {
    // ========================================================================
    // Data Errors
    // ========================================================================
    /// The compilation report could not be decoded or normalized.
    #[snafu(display("failed to normalize compilation report: {source}"))]
    Normalize {
        /// Underlying core error.
        source: CoreError,
    },

    /// The event body is not a valid payload for its type.
    #[snafu(display("invalid event payload: {source}"))]
    InvalidPayload {
        /// Underlying core error.
        source: CoreError,
    },

    /// The orchestrator attempted an illegal state change.
    #[snafu(display("invalid job state transition from {from} to {to}"))]
    InvalidTransition {
        /// State the job was in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },

    /// A second handler was registered for the same event kind.
    #[snafu(display("a handler is already registered for {kind} events"))]
    DuplicateHandler {
        /// Event kind registered twice.
        kind: &'static str,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// A remote collaborator answered with a failure.
    #[snafu(display("{collaborator} failed: {reason}"))]
    Collaborator {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// An HTTP request to a collaborator failed at the transport level.
    #[snafu(display("{collaborator} request failed: {source}"))]
    Http {
        /// Which collaborator was called.
        collaborator: &'static str,
        /// Underlying client error.
        source: reqwest::Error,
    },

    /// Reading a local file needed by a collaborator failed.
    #[snafu(display("failed to read {path}: {source}"))]
    ReadFile {
        /// File that could not be read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// An external program could not be started.
    #[snafu(display("failed to spawn {program}: {source}"))]
    ProcessSpawn {
        /// Program that failed to start.
        program: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully.
    #[snafu(display("{program} exited with code {exit_code}: {stderr}"))]
    ProcessFailed {
        /// Program that failed.
        program: String,
        /// Exit code, or -1 when killed by a signal.
        exit_code: i32,
        /// Captured standard error, bounded.
        stderr: String,
    },

    /// An external program produced output that could not be decoded.
    #[snafu(display("{program} produced malformed output: {source}"))]
    MalformedOutput {
        /// Program whose output was rejected.
        program: String,
        /// Underlying core error.
        source: CoreError,
    },

    // ========================================================================
    // Sink Errors
    // ========================================================================
    /// The bulk sink could not be reached or refused the whole batch.
    #[snafu(display("bulk sink unavailable: {reason}"))]
    SinkUnavailable {
        /// What went wrong.
        reason: String,
    },

    /// The bulk sink did not answer within the submission deadline.
    #[snafu(display("bulk sink did not answer within {timeout_secs}s"))]
    SinkTimeout {
        /// Deadline that expired.
        timeout_secs: u64,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The run was cancelled by its caller.
    #[snafu(display("verification cancelled"))]
    Cancelled,
}

impl PreviewError {
    /// Whether this error came from an external collaborator rather than
    /// from the data it returned or from the run's own lifecycle.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. }
                | Self::Http { .. }
                | Self::ReadFile { .. }
                | Self::ProcessSpawn { .. }
                | Self::ProcessFailed { .. }
                | Self::SinkUnavailable { .. }
                | Self::SinkTimeout { .. }
        )
    }

    /// Short text suitable for a commit status description.
    pub fn status_reason(&self) -> String {
        match self {
            Self::ProcessFailed { program, exit_code, .. } => format!("{program} exited with code {exit_code}"),
            Self::Http { collaborator, .. } => format!("{collaborator} unreachable"),
            other => other.to_string(),
        }
    }
}
