//! Verification job state machine.

use serde::Deserialize;
use serde::Serialize;

/// Stage of a verification job.
///
/// ```text
/// Created -> Pending -> DiscoveringAndDeploying -> Compiling -> Normalizing -> Submitting
///                              |                                                 |
///                              +--(no hosts)--> Succeeded <----------------------+
///                                                                 Failed <-------+
/// any non-terminal state -> Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Job accepted, nothing reported yet.
    Created,
    /// Pending status reported.
    Pending,
    /// Host discovery and environment deployment running concurrently.
    DiscoveringAndDeploying,
    /// Preview compilation running.
    Compiling,
    /// Report being normalized.
    Normalizing,
    /// Records being submitted to the sink.
    Submitting,
    /// Every affected host compiled.
    Succeeded,
    /// At least one host failed to compile.
    Failed,
    /// The run could not complete.
    Errored,
}

impl JobState {
    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Errored)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Errored {
            return true;
        }
        matches!(
            (self, next),
            (Created, Pending)
                | (Pending, DiscoveringAndDeploying)
                | (DiscoveringAndDeploying, Compiling)
                | (DiscoveringAndDeploying, Succeeded)
                | (Compiling, Normalizing)
                | (Normalizing, Submitting)
                | (Submitting, Succeeded)
                | (Submitting, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::DiscoveringAndDeploying => "discovering_and_deploying",
            Self::Compiling => "compiling",
            Self::Normalizing => "normalizing",
            Self::Submitting => "submitting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
