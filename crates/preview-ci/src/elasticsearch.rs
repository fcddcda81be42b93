//! Elasticsearch bulk sink.
//!
//! Records are sent in one `_bulk` request. Each document is preceded by an
//! `index` action naming the target index, and carries its kind in a
//! `record_type` field.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::collaborators::BulkSink;
use crate::collaborators::RejectedDocument;
use crate::collaborators::SinkDocument;
use crate::collaborators::SubmitOutcome;
use crate::constants::USER_AGENT;
use crate::error::PreviewError;
use crate::error::Result;

/// Field carrying the record kind in every indexed document.
pub const RECORD_TYPE_FIELD: &str = "record_type";

/// Bulk sink backed by one Elasticsearch node.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    http: reqwest::Client,
    bulk_url: String,
}

impl ElasticsearchSink {
    /// Create a sink for `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError::SinkUnavailable`] if the HTTP client cannot be
    /// built.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).timeout(timeout).build().map_err(|e| {
            PreviewError::SinkUnavailable {
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            http,
            bulk_url: bulk_url(host, port),
        })
    }

    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }
}

pub fn bulk_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/_bulk")
}

/// Encode documents as a newline-delimited bulk body.
pub fn build_bulk_body(index: &str, documents: &[SinkDocument]) -> String {
    let action = json!({ "index": { "_index": index } }).to_string();
    let mut body = String::new();
    for document in documents {
        let mut source = document.body.clone();
        if let Value::Object(fields) = &mut source {
            fields.insert(RECORD_TYPE_FIELD.to_string(), Value::String(document.kind.as_str().to_string()));
        }
        body.push_str(&action);
        body.push('\n');
        body.push_str(&source.to_string());
        body.push('\n');
    }
    body
}

/// Split a bulk response into accepted and rejected items.
///
/// `documents` is the submitted batch; rejected items are paired with the
/// document at the same position.
pub fn parse_bulk_response(response: &Value, documents: &[SinkDocument]) -> SubmitOutcome {
    let items = response.get("items").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();

    let mut outcome = SubmitOutcome::default();
    for (position, item) in items.iter().enumerate() {
        // Each item is keyed by its action, e.g. {"index": {...}}.
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
        if (200..300).contains(&status) {
            outcome.accepted += 1;
        } else {
            outcome.rejected.push(RejectedDocument {
                status,
                error: result.get("error").cloned().unwrap_or(Value::Null),
                data: documents.get(position).map(|d| d.body.clone()),
            });
        }
    }
    outcome
}

#[async_trait]
impl BulkSink for ElasticsearchSink {
    async fn submit(&self, index: &str, documents: &[SinkDocument]) -> Result<SubmitOutcome> {
        if documents.is_empty() {
            return Ok(SubmitOutcome::default());
        }
        let body = build_bulk_body(index, documents);
        debug!(url = %self.bulk_url, index, documents = documents.len(), bytes = body.len(), "bulk request");

        let unavailable = |e: reqwest::Error| PreviewError::SinkUnavailable { reason: e.to_string() };
        let response = self
            .http
            .post(&self.bulk_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PreviewError::SinkUnavailable {
                reason: format!("bulk request returned {status}: {}", text.chars().take(512).collect::<String>()),
            });
        }

        let parsed: Value = response.json().await.map_err(unavailable)?;
        let outcome = parse_bulk_response(&parsed, documents);
        if parsed.get("errors").and_then(Value::as_bool) == Some(true) && outcome.rejected.is_empty() {
            warn!(index, "bulk response flagged errors but no item was rejected");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use preview_core::RecordKind;

    use super::*;

    fn doc(kind: RecordKind, body: Value) -> SinkDocument {
        SinkDocument { kind, body }
    }

    #[test]
    fn test_bulk_body_pairs_actions_and_sources() {
        let documents = vec![
            doc(RecordKind::Summary, json!({"node_count": 2})),
            doc(RecordKind::Node, json!({"name": "web01"})),
        ];
        let body = build_bulk_body("preview-gate-2024.01", &documents);
        let lines: Vec<Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));
        assert_eq!(lines[0], json!({"index": {"_index": "preview-gate-2024.01"}}));
        assert_eq!(lines[1], json!({"node_count": 2, "record_type": "summary"}));
        assert_eq!(lines[3]["record_type"], "node");
    }

    #[test]
    fn test_parse_bulk_response_partial_rejection() {
        let documents = vec![
            doc(RecordKind::Node, json!({"name": "a"})),
            doc(RecordKind::Node, json!({"name": "b"})),
        ];
        let response = json!({
            "errors": true,
            "items": [
                {"index": {"status": 201}},
                {"index": {"status": 409, "error": {"type": "version_conflict_engine_exception"}}}
            ]
        });

        let outcome = parse_bulk_response(&response, &documents);
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].status, 409);
        assert_eq!(outcome.rejected[0].error["type"], "version_conflict_engine_exception");
        assert_eq!(outcome.rejected[0].data, Some(json!({"name": "b"})));
    }

    #[test]
    fn test_parse_bulk_response_without_items() {
        let outcome = parse_bulk_response(&json!({"took": 1}), &[]);
        assert_eq!(outcome, SubmitOutcome::default());
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_unavailable() {
        let sink = ElasticsearchSink::new("127.0.0.1", 9, Duration::from_millis(200)).unwrap();
        let err = sink.submit("idx", &[doc(RecordKind::Summary, json!({}))]).await.unwrap_err();
        assert!(matches!(err, PreviewError::SinkUnavailable { .. }));
    }
}
