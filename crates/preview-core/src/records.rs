//! Normalized records handed to the bulk sink.
//!
//! Every record is wrapped in [`Stamped`], which flattens the job's
//! [`Stamp`] next to the record's own fields so each document is
//! self-describing once indexed.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use snafu::ResultExt;
use uuid::Uuid;

use crate::error::RecordEncodeSnafu;
use crate::error::Result;
use crate::report::Breakdown;
use crate::report::CompilationError;

/// Fields shared by every record produced for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Event identifier of the job.
    pub message_id: Uuid,
    /// Pull request number.
    pub pull_request: u64,
    /// Branch the pull request targets.
    pub base_environment: String,
    /// Repository identifier.
    pub repository: String,
}

/// A record together with its job stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    #[serde(flatten)]
    pub stamp: Stamp,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Stamped<T> {
    pub fn new(stamp: Stamp, record: T) -> Self {
        Self { stamp, record }
    }
}

/// Kind of a normalized record, used as the sink's `record_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Summary,
    Node,
    Error,
    Warning,
    ResourceChange,
    EdgeChange,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Node => "node",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::ResourceChange => "resource_change",
            Self::EdgeChange => "edge_change",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job-level counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub node_count: u64,
    /// Hosts with no compilation errors.
    pub success_count: u64,
    /// Hosts with at least one compilation error.
    pub failure_count: u64,
    pub equal: Breakdown,
    pub conflicting: Breakdown,
    pub failures: Breakdown,
    pub preview_failures: Breakdown,
}

/// A compilation error as attached to a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    #[serde(flatten)]
    pub error: CompilationError,
    /// Manifest that raised the error.
    pub manifest: String,
}

/// A deduplicated compilation error with every host it affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(flatten)]
    pub error: NodeError,
    pub nodes: Vec<String>,
}

/// One `line:pos` warning location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningLocation {
    pub line: u32,
    pub pos: u32,
}

/// Warning locations within one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningManifest {
    pub file: String,
    pub locations: Vec<WarningLocation>,
}

/// All warnings sharing one issue code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub issue_code: String,
    pub count: u64,
    pub manifests: Vec<WarningManifest>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A resource whose catalog entry differs between environments.
///
/// On a host record `attributes` lists the attributes flagged for that
/// host; on a flat record it lists those flagged for any host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub file: String,
    pub line: u32,
    pub attributes: Vec<String>,
}

/// A resource change with every host it affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChangeRecord {
    #[serde(flatten)]
    pub change: ResourceChange,
    pub nodes: Vec<String>,
}

/// Direction of a dependency edge change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// Edge present only in the candidate catalog.
    Added,
}

/// A dependency edge between two resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeChange {
    pub edge: EdgeDirection,
    pub source_type: String,
    pub source_title: String,
    pub target_type: String,
    pub target_title: String,
}

/// An edge change with every host it affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeChangeRecord {
    #[serde(flatten)]
    pub change: EdgeChange,
    pub nodes: Vec<String>,
}

/// Per-host record with the issues that concern that host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub error_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub errors: Vec<NodeError>,
    pub resource_changes: Vec<ResourceChange>,
    pub edge_changes: Vec<EdgeChange>,
}

impl NodeRecord {
    /// Whether the host compiled without errors.
    pub fn succeeded(&self) -> bool {
        self.error_count == 0
    }
}

/// Everything normalization produces for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReport {
    pub summary: Stamped<Summary>,
    pub nodes: Vec<Stamped<NodeRecord>>,
    pub errors: Vec<Stamped<ErrorRecord>>,
    pub warnings: Vec<Stamped<WarningRecord>>,
    pub resource_changes: Vec<Stamped<ResourceChangeRecord>>,
    pub edge_changes: Vec<Stamped<EdgeChangeRecord>>,
}

impl NormalizedReport {
    /// Total number of records, the summary included.
    pub fn record_count(&self) -> usize {
        1 + self.nodes.len()
            + self.errors.len()
            + self.warnings.len()
            + self.resource_changes.len()
            + self.edge_changes.len()
    }

    /// Whether every host compiled without errors.
    pub fn all_hosts_succeeded(&self) -> bool {
        self.nodes.iter().all(|node| node.record.succeeded())
    }

    /// Stamps of every record, the summary first.
    pub fn stamps(&self) -> impl Iterator<Item = &Stamp> {
        std::iter::once(&self.summary.stamp)
            .chain(self.nodes.iter().map(|r| &r.stamp))
            .chain(self.errors.iter().map(|r| &r.stamp))
            .chain(self.warnings.iter().map(|r| &r.stamp))
            .chain(self.resource_changes.iter().map(|r| &r.stamp))
            .chain(self.edge_changes.iter().map(|r| &r.stamp))
    }

    /// Encode every record as a JSON document, in sink submission order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::RecordEncode`] if a record cannot be
    /// represented as JSON.
    pub fn documents(&self) -> Result<Vec<(RecordKind, Value)>> {
        let mut documents = Vec::with_capacity(self.record_count());
        documents.push(encode(RecordKind::Summary, &self.summary)?);
        for record in &self.nodes {
            documents.push(encode(RecordKind::Node, record)?);
        }
        for record in &self.errors {
            documents.push(encode(RecordKind::Error, record)?);
        }
        for record in &self.warnings {
            documents.push(encode(RecordKind::Warning, record)?);
        }
        for record in &self.resource_changes {
            documents.push(encode(RecordKind::ResourceChange, record)?);
        }
        for record in &self.edge_changes {
            documents.push(encode(RecordKind::EdgeChange, record)?);
        }
        Ok(documents)
    }
}

fn encode<T: Serialize>(kind: RecordKind, record: &T) -> Result<(RecordKind, Value)> {
    let value = serde_json::to_value(record).context(RecordEncodeSnafu { kind: kind.as_str() })?;
    Ok((kind, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> Stamp {
        Stamp {
            message_id: Uuid::nil(),
            pull_request: 7,
            base_environment: "production".to_string(),
            repository: "ops/puppet".to_string(),
        }
    }

    #[test]
    fn test_stamped_record_is_flat() {
        let record = Stamped::new(
            stamp(),
            ResourceChangeRecord {
                change: ResourceChange {
                    kind: "File".to_string(),
                    title: "/etc/motd".to_string(),
                    file: "site.pp".to_string(),
                    line: 3,
                    attributes: vec!["mode".to_string()],
                },
                nodes: vec!["host1".to_string()],
            },
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "File");
        assert_eq!(value["line"], 3);
        assert_eq!(value["pull_request"], 7);
        assert_eq!(value["repository"], "ops/puppet");
        assert_eq!(value["nodes"], serde_json::json!(["host1"]));
    }

    #[test]
    fn test_edge_direction_serializes_as_tag() {
        let change = EdgeChange {
            edge: EdgeDirection::Added,
            source_type: "Class".to_string(),
            source_title: "A".to_string(),
            target_type: "File".to_string(),
            target_title: "/x".to_string(),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["edge"], "added");
    }

    #[test]
    fn test_error_record_flattens_details() {
        let mut error = CompilationError::new("boom on <node>");
        error.details.insert("line".to_string(), serde_json::json!(4));
        let record = ErrorRecord {
            error: NodeError {
                error,
                manifest: "m.pp".to_string(),
            },
            nodes: vec![],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["message"], "boom on <node>");
        assert_eq!(value["line"], 4);
        assert_eq!(value["manifest"], "m.pp");
    }

    #[test]
    fn test_documents_start_with_summary() {
        let report = NormalizedReport {
            summary: Stamped::new(stamp(), Summary::default()),
            nodes: vec![],
            errors: vec![],
            warnings: vec![],
            resource_changes: vec![],
            edge_changes: vec![],
        };
        let documents = report.documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].0, RecordKind::Summary);
        assert_eq!(documents[0].1["message_id"], Uuid::nil().to_string());
        assert!(report.all_hosts_succeeded());
    }
}
