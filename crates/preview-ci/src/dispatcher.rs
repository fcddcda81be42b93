//! Event dispatcher.
//!
//! Routes each queued event to the handler registered for its kind. The
//! registry is built once at startup and never changes afterwards.
//!
//! # Task Tracking (Tiger Style)
//!
//! Jobs run in a `JoinSet` bounded by a semaphore. A permit is taken before
//! an event is dequeued, so events start in queue order; with the default
//! bound of one, each job finishes before the next is dequeued. On
//! shutdown the dispatcher waits for in-flight jobs to complete.

use std::collections::HashMap;
use std::sync::Arc;

use preview_core::Event;
use preview_core::EventKind;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::constants::DEFAULT_MAX_CONCURRENT_JOBS;
use crate::constants::MAX_CONCURRENT_JOBS;
use crate::error::PreviewError;
use crate::error::Result;
use crate::handlers::EventHandler;
use crate::queue::QueueReceiver;
use crate::queue::QueuedEvent;

/// Immutable mapping from event kind to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Handler for a declared event type, if its kind is registered.
    pub fn resolve(&self, event_type: &str) -> Option<&Arc<dyn EventHandler>> {
        EventKind::from_event_type(event_type).and_then(|kind| self.handlers.get(&kind))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register the handler for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError::DuplicateHandler`] if `kind` already has one.
    pub fn register(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<Self> {
        if self.handlers.contains_key(&kind) {
            return Err(PreviewError::DuplicateHandler { kind: kind.as_str() });
        }
        self.handlers.insert(kind, handler);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler completed.
    Handled,
    /// No handler is registered for the event type.
    Unhandled,
    /// The handler returned an error, which was logged.
    Failed,
}

/// Consumes the job queue and runs handlers.
pub struct Dispatcher {
    registry: HandlerRegistry,
    max_concurrent_jobs: usize,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }

    /// Allow up to `n` jobs at once, clamped to `1..=MAX_CONCURRENT_JOBS`.
    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n.clamp(1, MAX_CONCURRENT_JOBS);
        self
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Run the handler for one event.
    ///
    /// Handler failures are logged here and never returned.
    pub async fn dispatch(&self, event: &Event, cancel: &CancellationToken) -> DispatchOutcome {
        let span = info_span!(
            "job",
            event_type = %event.event_type,
            message_id = %event.id,
            delivery = %event.delivery(),
        );

        async {
            let Some(handler) = self.registry.resolve(&event.event_type) else {
                info!("no handler registered for event type, dropping");
                return DispatchOutcome::Unhandled;
            };

            debug!(handler = handler.name(), "dispatching event");
            match handler.handle(event, cancel).await {
                Ok(()) => {
                    debug!(handler = handler.name(), "event handled");
                    DispatchOutcome::Handled
                }
                Err(e) => {
                    error!(handler = handler.name(), error = %e, "event handler failed");
                    DispatchOutcome::Failed
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Consume the queue until every sender is gone and the queue is
    /// drained, or until `cancel` fires.
    ///
    /// Cancelling stops dequeuing and cancels in-flight jobs; the loop
    /// still waits for them to return.
    pub async fn run(self: Arc<Self>, mut queue: QueueReceiver, cancel: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut jobs: JoinSet<()> = JoinSet::new();

        info!(
            handlers = self.registry.len(),
            max_concurrent_jobs = self.max_concurrent_jobs,
            "dispatcher started"
        );

        loop {
            while let Some(joined) = jobs.try_join_next() {
                log_join_error(joined);
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let queued = tokio::select! {
                _ = cancel.cancelled() => break,
                queued = queue.recv() => match queued {
                    Some(queued) => queued,
                    None => {
                        debug!("job queue closed and drained");
                        break;
                    }
                },
            };

            let dispatcher = Arc::clone(&self);
            let job_cancel = cancel.child_token();
            jobs.spawn(async move {
                let QueuedEvent { event, ticket } = queued;
                dispatcher.dispatch(&event, &job_cancel).await;
                drop(ticket);
                drop(permit);
            });
        }

        let in_flight = jobs.len();
        if in_flight > 0 {
            info!(in_flight, "waiting for in-flight jobs to complete");
            while let Some(joined) = jobs.join_next().await {
                log_join_error(joined);
            }
        }

        let abandoned = queue.outstanding();
        if abandoned > 0 {
            warn!(abandoned, "dispatcher stopped with events still queued");
        }
        info!("dispatcher stopped");
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "job task panicked");
    }
}
