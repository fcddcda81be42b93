//! Raw `puppet preview` overview report.
//!
//! Mirrors the `overview-json` view. Every section except `all_nodes` is
//! optional upstream, and sections may also be sent as explicit `null`;
//! both decode to empty values so normalization never has to special-case
//! absence.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use snafu::ResultExt;

use crate::error::ReportDecodeSnafu;
use crate::error::Result;

/// Hosts keyed by a `file:line` location.
pub type HostsByLocation = BTreeMap<String, Vec<String>>;

/// Locations keyed by resource title.
pub type LocationsByTitle = BTreeMap<String, HostsByLocation>;

/// Decode `null` as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One compilation report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationReport {
    /// Aggregate statistics.
    #[serde(default, deserialize_with = "nullable")]
    pub stats: ReportStats,

    /// Per-host compilation outcomes.
    #[serde(default, deserialize_with = "nullable")]
    pub all_nodes: Vec<HostOutcome>,

    /// Preview compilation results.
    #[serde(default, deserialize_with = "nullable")]
    pub preview: PreviewSection,

    /// Differences between baseline and preview catalogs.
    #[serde(default, deserialize_with = "nullable")]
    pub changes: ChangesSection,
}

impl CompilationReport {
    /// Decode a report from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ReportDecode`] if the bytes are not a
    /// report.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context(ReportDecodeSnafu)
    }
}

/// A `{total, percent}` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    /// Absolute count.
    #[serde(default, deserialize_with = "nullable")]
    pub total: u64,
    /// Share of all nodes.
    #[serde(default, deserialize_with = "nullable")]
    pub percent: f64,
}

/// Failure statistics, with the preview-only subset nested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureStats {
    /// Absolute count.
    #[serde(default, deserialize_with = "nullable")]
    pub total: u64,
    /// Share of all nodes.
    #[serde(default, deserialize_with = "nullable")]
    pub percent: f64,
    /// Failures that only occur in the preview environment.
    #[serde(default, deserialize_with = "nullable")]
    pub preview: Breakdown,
}

/// Aggregate statistics block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    /// Number of nodes compiled.
    #[serde(default, deserialize_with = "nullable")]
    pub node_count: u64,
    /// Nodes whose catalogs are equal.
    #[serde(default, deserialize_with = "nullable")]
    pub equal: Breakdown,
    /// Nodes whose catalogs conflict.
    #[serde(default, deserialize_with = "nullable")]
    pub conflicting: Breakdown,
    /// Nodes that failed to compile.
    #[serde(default, deserialize_with = "nullable")]
    pub failures: FailureStats,
}

/// Compilation outcome for one host.
///
/// Unknown fields are kept in `extra` and carried into the node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostOutcome {
    /// Host certname.
    pub name: String,
    /// Number of compilation errors for this host.
    #[serde(default, deserialize_with = "nullable")]
    pub error_count: u64,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `preview` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewSection {
    /// Compilation errors grouped by manifest and affected hosts.
    #[serde(default, deserialize_with = "nullable")]
    pub compilation_errors: Vec<CompilationErrorGroup>,
    /// Warnings grouped by issue code.
    #[serde(default, deserialize_with = "nullable")]
    pub warning_count_by_issue_code: Vec<WarningEntry>,
}

/// Errors raised by one manifest for a set of hosts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationErrorGroup {
    /// Manifest that raised the errors.
    #[serde(default, deserialize_with = "nullable")]
    pub manifest: String,
    /// Hosts affected by the errors.
    #[serde(default, deserialize_with = "nullable")]
    pub nodes: Vec<String>,
    /// The errors themselves.
    #[serde(default, deserialize_with = "nullable")]
    pub errors: Vec<CompilationError>,
}

/// One compilation error.
///
/// Equality covers the message and every other upstream field, which is
/// what error deduplication compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationError {
    /// Error text, possibly mentioning host names.
    pub message: String,
    /// Remaining upstream fields (file, line, pos, ...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl CompilationError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Map::new(),
        }
    }
}

/// Warnings sharing one issue code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningEntry {
    /// Issue code, e.g. `DEPRECATED_NAME_AS_TYPE`.
    pub issue_code: String,
    /// Number of occurrences.
    #[serde(default, deserialize_with = "nullable")]
    pub count: u64,
    /// `line:col` locations keyed by manifest file.
    #[serde(default, deserialize_with = "nullable")]
    pub manifests: BTreeMap<String, Vec<String>>,
    /// Remaining upstream fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `changes` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesSection {
    /// Conflicts keyed by resource type.
    #[serde(default, deserialize_with = "nullable")]
    pub resource_type_changes: BTreeMap<String, ResourceTypeChanges>,
    /// Dependency edge changes.
    #[serde(default, deserialize_with = "nullable")]
    pub edge_changes: EdgeChanges,
}

/// Conflicts for one resource type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypeChanges {
    /// title -> `file:line` -> hosts.
    #[serde(default, deserialize_with = "nullable")]
    pub conflicting_resources: LocationsByTitle,
    /// attribute name -> where it conflicts.
    #[serde(default, deserialize_with = "nullable")]
    pub attribute_issues: BTreeMap<String, AttributeIssue>,
}

/// Where one attribute conflicts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeIssue {
    /// title -> `file:line` -> hosts.
    #[serde(default, deserialize_with = "nullable")]
    pub conflicting_in: LocationsByTitle,
}

impl AttributeIssue {
    /// Hosts for which this attribute conflicts at `title` / `location`.
    pub fn hosts_at(&self, title: &str, location: &str) -> &[String] {
        self.conflicting_in
            .get(title)
            .and_then(|locations| locations.get(location))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Dependency edge changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeChanges {
    /// source -> target -> hosts.
    #[serde(default, deserialize_with = "nullable")]
    pub added_edges: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}
