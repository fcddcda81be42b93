//! Webhook event envelope.
//!
//! Defines the closed set of event kinds the service acts on and the
//! immutable envelope that travels through the job queue.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::constants::PING_EVENT_TYPE;
use crate::constants::PULL_REQUEST_EVENT_TYPE;

/// Event kinds with a registered meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A pull request was opened, updated, or otherwise changed.
    PullRequest,
    /// GitHub verifying a newly configured webhook.
    Ping,
}

impl EventKind {
    /// Resolve a declared event type by exact string match.
    ///
    /// Returns `None` for types without a registered meaning.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            PULL_REQUEST_EVENT_TYPE => Some(Self::PullRequest),
            PING_EVENT_TYPE => Some(Self::Ping),
            _ => None,
        }
    }

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequest => PULL_REQUEST_EVENT_TYPE,
            Self::Ping => PING_EVENT_TYPE,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound webhook event.
///
/// `id` is always a UUID. When the delivery header was missing or not a
/// UUID a fresh one is generated and the supplied value is kept in
/// `raw_id` for log correlation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Declared event type, as sent by the source.
    pub event_type: String,

    /// Delivery identifier.
    pub id: Uuid,

    /// Supplied delivery identifier when it was not a valid UUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,

    /// Decoded JSON body.
    pub body: serde_json::Value,

    /// When the listener accepted the event.
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Create an event from the delivery headers and decoded body.
    pub fn new(event_type: impl Into<String>, delivery: Option<&str>, body: serde_json::Value) -> Self {
        let (id, raw_id) = match delivery {
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => (id, None),
                Err(_) if raw.is_empty() => (Uuid::new_v4(), None),
                Err(_) => (Uuid::new_v4(), Some(raw.to_string())),
            },
            None => (Uuid::new_v4(), None),
        };

        Self {
            event_type: event_type.into(),
            id,
            raw_id,
            body,
            received_at: Utc::now(),
        }
    }

    /// Set the receipt time.
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// The registered kind of this event, if any.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_event_type(&self.event_type)
    }

    /// The delivery identifier as the source sent it.
    pub fn delivery(&self) -> String {
        self.raw_id.clone().unwrap_or_else(|| self.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_event_type() {
        assert_eq!(EventKind::from_event_type("pull_request"), Some(EventKind::PullRequest));
        assert_eq!(EventKind::from_event_type("ping"), Some(EventKind::Ping));
        assert_eq!(EventKind::from_event_type("push"), None);
        assert_eq!(EventKind::from_event_type("Pull_Request"), None);
    }

    #[test]
    fn test_valid_delivery_id_is_kept() {
        let id = "72d3162e-cc78-11e3-81ab-4c9367dc0958";
        let event = Event::new("pull_request", Some(id), serde_json::json!({}));
        assert_eq!(event.id.to_string(), id);
        assert!(event.raw_id.is_none());
        assert_eq!(event.delivery(), id);
    }

    #[test]
    fn test_malformed_delivery_id_is_preserved() {
        let event = Event::new("pull_request", Some("not-a-uuid"), serde_json::json!({}));
        assert_eq!(event.raw_id.as_deref(), Some("not-a-uuid"));
        assert_eq!(event.delivery(), "not-a-uuid");
        assert_ne!(event.id.to_string(), "not-a-uuid");
    }

    #[test]
    fn test_missing_delivery_id_is_generated() {
        let event = Event::new("ping", None, serde_json::json!({}));
        assert!(event.raw_id.is_none());
        assert_eq!(event.kind(), Some(EventKind::Ping));

        let event = Event::new("ping", Some(""), serde_json::json!({}));
        assert!(event.raw_id.is_none());
    }
}
