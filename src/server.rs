//! Webhook listener.
//!
//! Accepts GitHub deliveries on any path and method, checks the signature
//! when a secret is configured, and enqueues the event. Responses:
//!
//! | Status | When                                  |
//! |--------|---------------------------------------|
//! | 200    | event enqueued, body `ok`             |
//! | 400    | body is not valid JSON                |
//! | 401    | signature missing or wrong            |
//! | 500    | the job queue is no longer accepting  |

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use preview_ci::QueueSender;
use preview_core::Event;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::signature::SIGNATURE_HEADER;
use crate::signature::SignatureVerifier;

/// Header naming the event type.
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the delivery identifier.
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Largest accepted body; GitHub caps payloads at 25 MiB.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared listener state.
#[derive(Debug, Clone)]
pub struct ListenerState {
    queue: QueueSender,
    verifier: Option<SignatureVerifier>,
}

impl ListenerState {
    pub fn new(queue: QueueSender, verifier: Option<SignatureVerifier>) -> Self {
        Self { queue, verifier }
    }
}

/// Build the listener router.
pub fn router(state: ListenerState) -> Router {
    Router::new()
        .fallback(receive_webhook)
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
        .with_state(Arc::new(state))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn receive_webhook(
    State(state): State<Arc<ListenerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let event_type = header(&headers, EVENT_HEADER).unwrap_or_default();
    let delivery = header(&headers, DELIVERY_HEADER);

    if let Some(verifier) = &state.verifier {
        if let Err(e) = verifier.verify(&body, header(&headers, SIGNATURE_HEADER)) {
            warn!(event_type, delivery, error = %e, "rejecting webhook with bad signature");
            return (StatusCode::UNAUTHORIZED, e.to_string());
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(event_type, delivery, error = %e, "invalid JSON in webhook body");
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let event = Event::new(event_type, delivery, payload);
    info!(
        event_type = %event.event_type,
        message_id = %event.id,
        delivery = %event.delivery(),
        "received webhook"
    );

    match state.queue.enqueue(event) {
        Ok(()) => {
            debug!(outstanding = state.queue.outstanding(), "event enqueued");
            (StatusCode::OK, "ok".to_string())
        }
        Err(e) => {
            error!(error = %e, "failed to enqueue webhook");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Server error: {e}"))
        }
    }
}
