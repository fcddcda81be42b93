//! Event handler trait and implementations.
//!
//! Handlers are registered against an [`EventKind`] in the dispatcher's
//! [`crate::HandlerRegistry`]. Each handler receives the whole event and a
//! cancellation token scoped to that job.

use std::sync::Arc;

use async_trait::async_trait;
use preview_core::Event;
use preview_core::EventKind;
use preview_core::PingPayload;
use preview_core::PullRequestPayload;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collaborators::CollaboratorFactory;
use crate::error::InvalidPayloadSnafu;
use crate::error::Result;
use crate::orchestrator::OrchestratorConfig;
use crate::orchestrator::VerificationJob;
use crate::orchestrator::VerificationOrchestrator;

/// Trait for handling queued events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be processed. The
    /// dispatcher logs it and moves on to the next event.
    async fn handle(&self, event: &Event, cancel: &CancellationToken) -> Result<()>;

    /// Get the handler name for logging.
    fn name(&self) -> &str;
}

/// Verifies pull requests when they are opened or their head changes.
pub struct PullRequestHandler {
    factory: Arc<dyn CollaboratorFactory>,
    config: Arc<OrchestratorConfig>,
}

impl PullRequestHandler {
    pub fn new(factory: Arc<dyn CollaboratorFactory>, config: Arc<OrchestratorConfig>) -> Self {
        Self { factory, config }
    }
}

#[async_trait]
impl EventHandler for PullRequestHandler {
    async fn handle(&self, event: &Event, cancel: &CancellationToken) -> Result<()> {
        let payload = PullRequestPayload::from_value(&event.body).context(InvalidPayloadSnafu)?;

        if !payload.triggers_verification() {
            info!(
                action = %payload.action,
                pull_request = payload.number,
                "pull request action does not change code, ignoring"
            );
            return Ok(());
        }

        let collaborators = self.factory.for_pull_request(&payload);
        let job = VerificationJob {
            message_id: event.id,
            payload,
            received_at: event.received_at,
        };
        VerificationOrchestrator::new(collaborators, Arc::clone(&self.config))
            .run(&job, cancel)
            .await
            .map(|_| ())
    }

    fn name(&self) -> &str {
        EventKind::PullRequest.as_str()
    }
}

/// Acknowledges webhook configuration pings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingHandler;

#[async_trait]
impl EventHandler for PingHandler {
    async fn handle(&self, event: &Event, _cancel: &CancellationToken) -> Result<()> {
        let ping = PingPayload::from_value(&event.body).context(InvalidPayloadSnafu)?;
        info!(
            hook_id = ?ping.hook_id,
            zen = ping.zen.as_deref().unwrap_or_default(),
            "webhook ping received"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        EventKind::Ping.as_str()
    }
}
