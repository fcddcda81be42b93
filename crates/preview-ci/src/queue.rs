//! Ordered job queue between the webhook listener and the dispatcher.
//!
//! An unbounded multi-producer, single-consumer channel. Enqueueing never
//! waits. Every event carries a [`JobTicket`] that counts it as outstanding
//! until the dispatcher drops it after the handler returns, which lets the
//! service detect when it has been idle.

use std::sync::Arc;
use std::time::Duration;

use preview_core::Event;
use tokio::sync::mpsc;
use tokio::sync::watch;

/// Constructor for the queue's two ends.
pub struct JobQueue;

impl JobQueue {
    /// Create a connected sender and receiver.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0usize);
        let outstanding = Arc::new(outstanding);
        (
            QueueSender {
                tx,
                outstanding: Arc::clone(&outstanding),
            },
            QueueReceiver { rx, outstanding },
        )
    }
}

/// Counts an event as outstanding until dropped.
#[derive(Debug)]
pub struct JobTicket {
    outstanding: Arc<watch::Sender<usize>>,
}

impl JobTicket {
    fn issue(outstanding: &Arc<watch::Sender<usize>>) -> Self {
        outstanding.send_modify(|n| *n += 1);
        Self {
            outstanding: Arc::clone(outstanding),
        }
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// An event taken from the queue, with its outstanding ticket.
#[derive(Debug)]
pub struct QueuedEvent {
    pub event: Event,
    pub ticket: JobTicket,
}

/// The queue's consumer end is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl std::fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("job queue is closed")
    }
}

impl std::error::Error for QueueClosed {}

/// Producer end of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::UnboundedSender<QueuedEvent>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl QueueSender {
    /// Append an event. Never waits.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the receiver has been dropped.
    pub fn enqueue(&self, event: Event) -> Result<(), QueueClosed> {
        let ticket = JobTicket::issue(&self.outstanding);
        // On failure the returned event is dropped with its ticket.
        self.tx.send(QueuedEvent { event, ticket }).map_err(|_| QueueClosed)
    }

    /// Events enqueued but not yet fully handled.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once no event has been outstanding for `quiet` in a row.
    pub async fn idle(&self, quiet: Duration) {
        let mut count = self.outstanding.subscribe();
        loop {
            if count.wait_for(|n| *n == 0).await.is_err() {
                return;
            }
            match tokio::time::timeout(quiet, count.changed()).await {
                Err(_) => return,
                Ok(Err(_)) => return,
                Ok(Ok(())) => continue,
            }
        }
    }
}

/// Consumer end of the queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<QueuedEvent>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl QueueReceiver {
    /// Wait for the next event. `None` once every sender is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<QueuedEvent> {
        self.rx.recv().await
    }

    /// Stop accepting new events; already queued events can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Events enqueued but not yet fully handled.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }
}
