//! Shutdown triggers.
//!
//! The service stops on SIGINT/SIGTERM or, when configured, once the job
//! queue has been idle long enough.

use std::time::Duration;

use preview_ci::QueueSender;
use tokio::signal;
use tracing::error;
use tracing::info;

/// What ended the serving phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    Idle,
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(err) => error!("failed to install Ctrl+C handler: {}", err),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => error!("failed to install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Resolve when the service should stop serving.
///
/// With `idle_after` set, an idle queue ends the service as well as a
/// signal. `queue` is only observed; it is dropped on return.
pub async fn wait_for_shutdown(queue: QueueSender, idle_after: Option<Duration>) -> ShutdownReason {
    let idle = async {
        match idle_after {
            Some(quiet) => queue.idle(quiet).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = shutdown_signal() => ShutdownReason::Signal,
        _ = idle => {
            info!(idle_secs = idle_after.map(|d| d.as_secs()), "service is idle, shutting down");
            ShutdownReason::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use preview_ci::JobQueue;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_idle_shutdown() {
        let (tx, _rx) = JobQueue::new();
        let reason = wait_for_shutdown(tx, Some(Duration::from_secs(10))).await;
        assert_eq!(reason, ShutdownReason::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_idle_shutdown_without_timeout() {
        let (tx, _rx) = JobQueue::new();
        let waited = tokio::time::timeout(Duration::from_secs(3600), wait_for_shutdown(tx, None)).await;
        assert!(waited.is_err());
    }
}
