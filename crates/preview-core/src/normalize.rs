//! Compilation report normalization.
//!
//! Turns one nested [`CompilationReport`] into flat, cross-referenced
//! records. Host records are built through a name -> index lookup so each
//! pass appends to the hosts it names without aliasing the raw report.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::constants::NODE_PLACEHOLDER;
use crate::error::CoreError;
use crate::error::Result;
use crate::identifier::parse_identifier;
use crate::records::EdgeChange;
use crate::records::EdgeChangeRecord;
use crate::records::EdgeDirection;
use crate::records::ErrorRecord;
use crate::records::NodeError;
use crate::records::NodeRecord;
use crate::records::NormalizedReport;
use crate::records::ResourceChange;
use crate::records::ResourceChangeRecord;
use crate::records::Stamp;
use crate::records::Stamped;
use crate::records::Summary;
use crate::records::WarningLocation;
use crate::records::WarningManifest;
use crate::records::WarningRecord;
use crate::report::Breakdown;
use crate::report::CompilationError;
use crate::report::CompilationErrorGroup;
use crate::report::CompilationReport;
use crate::report::EdgeChanges;
use crate::report::HostOutcome;
use crate::report::ResourceTypeChanges;
use crate::report::WarningEntry;

/// Identity of the job a report belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    /// Event identifier.
    pub message_id: Uuid,
    /// Pull request number.
    pub pull_request: u64,
    /// Branch the pull request targets.
    pub base_environment: String,
    /// Repository identifier.
    pub repository: String,
    /// Time used to name the sink index.
    pub timestamp: DateTime<Utc>,
}

impl JobContext {
    /// The fields stamped onto every record.
    pub fn stamp(&self) -> Stamp {
        Stamp {
            message_id: self.message_id,
            pull_request: self.pull_request,
            base_environment: self.base_environment.clone(),
            repository: self.repository.clone(),
        }
    }
}

/// Normalize a compilation report into stamped records.
///
/// Sections missing from the report produce empty collections.
///
/// # Errors
///
/// - [`CoreError::MalformedIdentifier`] if an edge endpoint is not `Kind[title]`
/// - [`CoreError::MalformedLocation`] if a resource or warning location does not parse
///
/// No partial result is returned on error.
pub fn normalize(report: &CompilationReport, ctx: &JobContext) -> Result<NormalizedReport> {
    let mut hosts = HostIndex::new(&report.all_nodes);

    let summary = summarize(report);
    let errors = collect_errors(&report.preview.compilation_errors, &mut hosts);
    let warnings = collect_warnings(&report.preview.warning_count_by_issue_code)?;
    let resource_changes = collect_resource_changes(&report.changes.resource_type_changes, &mut hosts)?;
    let edge_changes = collect_edge_changes(&report.changes.edge_changes, &mut hosts)?;

    let stamp = ctx.stamp();
    Ok(NormalizedReport {
        summary: Stamped::new(stamp.clone(), summary),
        nodes: stamp_all(&stamp, hosts.into_records()),
        errors: stamp_all(&stamp, errors),
        warnings: stamp_all(&stamp, warnings),
        resource_changes: stamp_all(&stamp, resource_changes),
        edge_changes: stamp_all(&stamp, edge_changes),
    })
}

fn stamp_all<T>(stamp: &Stamp, records: Vec<T>) -> Vec<Stamped<T>> {
    records.into_iter().map(|record| Stamped::new(stamp.clone(), record)).collect()
}

/// Host records in report order, looked up by name.
struct HostIndex {
    records: Vec<NodeRecord>,
    by_name: HashMap<String, Vec<usize>>,
}

impl HostIndex {
    fn new(outcomes: &[HostOutcome]) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::with_capacity(outcomes.len());
        let records = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| {
                by_name.entry(outcome.name.clone()).or_default().push(i);
                NodeRecord {
                    name: outcome.name.clone(),
                    error_count: outcome.error_count,
                    extra: outcome.extra.clone(),
                    errors: Vec::new(),
                    resource_changes: Vec::new(),
                    edge_changes: Vec::new(),
                }
            })
            .collect();
        Self { records, by_name }
    }

    /// Indices of the records named in `hosts`, each once, in report order.
    fn matching(&self, hosts: &[String]) -> BTreeSet<usize> {
        hosts
            .iter()
            .filter_map(|host| self.by_name.get(host))
            .flatten()
            .copied()
            .collect()
    }

    fn append(&mut self, hosts: &[String], mut apply: impl FnMut(&mut NodeRecord)) {
        for i in self.matching(hosts) {
            apply(&mut self.records[i]);
        }
    }

    fn into_records(self) -> Vec<NodeRecord> {
        self.records
    }
}

fn summarize(report: &CompilationReport) -> Summary {
    let stats = &report.stats;
    let success_count = report.all_nodes.iter().filter(|n| n.error_count == 0).count() as u64;
    let failure_count = report.all_nodes.len() as u64 - success_count;

    Summary {
        node_count: stats.node_count,
        success_count,
        failure_count,
        equal: stats.equal,
        conflicting: stats.conflicting,
        failures: Breakdown {
            total: stats.failures.total,
            percent: stats.failures.percent,
        },
        preview_failures: stats.failures.preview,
    }
}

/// Replace each host's literal name in the message with the placeholder.
///
/// Hosts are applied in listed order; empty names are skipped.
fn abstract_hosts(message: &str, hosts: &[String]) -> String {
    hosts
        .iter()
        .filter(|host| !host.is_empty())
        .fold(message.to_string(), |message, host| message.replace(host.as_str(), NODE_PLACEHOLDER))
}

/// Substitute host names, then drop exact duplicates keeping first occurrence.
fn dedup_group_errors(group: &CompilationErrorGroup) -> Vec<CompilationError> {
    let mut unique: Vec<CompilationError> = Vec::with_capacity(group.errors.len());
    for error in &group.errors {
        let abstracted = CompilationError {
            message: abstract_hosts(&error.message, &group.nodes),
            details: error.details.clone(),
        };
        if !unique.contains(&abstracted) {
            unique.push(abstracted);
        }
    }
    unique
}

fn collect_errors(groups: &[CompilationErrorGroup], hosts: &mut HostIndex) -> Vec<ErrorRecord> {
    let mut records = Vec::new();
    for group in groups {
        for error in dedup_group_errors(group) {
            let node_error = NodeError {
                error,
                manifest: group.manifest.clone(),
            };
            hosts.append(&group.nodes, |node| node.errors.push(node_error.clone()));
            records.push(ErrorRecord {
                error: node_error,
                nodes: group.nodes.clone(),
            });
        }
    }
    records
}

fn parse_warning_location(input: &str) -> Result<WarningLocation> {
    let malformed = || CoreError::MalformedLocation {
        what: "warning",
        input: input.to_string(),
    };
    let (line, pos) = input.split_once(':').ok_or_else(malformed)?;
    Ok(WarningLocation {
        line: line.trim().parse().map_err(|_| malformed())?,
        pos: pos.trim().parse().map_err(|_| malformed())?,
    })
}

fn collect_warnings(entries: &[WarningEntry]) -> Result<Vec<WarningRecord>> {
    entries
        .iter()
        .map(|entry| {
            let manifests = entry
                .manifests
                .iter()
                .map(|(file, locations)| {
                    Ok(WarningManifest {
                        file: file.clone(),
                        locations: locations.iter().map(|l| parse_warning_location(l)).collect::<Result<_>>()?,
                    })
                })
                .collect::<Result<_>>()?;
            Ok(WarningRecord {
                issue_code: entry.issue_code.clone(),
                count: entry.count,
                manifests,
                extra: entry.extra.clone(),
            })
        })
        .collect()
}

/// Split `file:line` at the last colon.
fn parse_resource_location(input: &str) -> Result<(String, u32)> {
    let malformed = || CoreError::MalformedLocation {
        what: "resource",
        input: input.to_string(),
    };
    let (file, line) = input.rsplit_once(':').ok_or_else(malformed)?;
    let line = line.trim().parse().map_err(|_| malformed())?;
    Ok((file.to_string(), line))
}

/// Attributes of `changes` that conflict at `title` / `location` for `host`.
fn attributes_for(changes: &ResourceTypeChanges, title: &str, location: &str, host: &str) -> Vec<String> {
    changes
        .attribute_issues
        .iter()
        .filter(|(_, issue)| issue.hosts_at(title, location).iter().any(|h| h == host))
        .map(|(name, _)| name.clone())
        .collect()
}

fn collect_resource_changes(
    by_type: &BTreeMap<String, ResourceTypeChanges>,
    hosts: &mut HostIndex,
) -> Result<Vec<ResourceChangeRecord>> {
    let mut records = Vec::new();
    for (kind, changes) in by_type {
        for (title, locations) in &changes.conflicting_resources {
            for (location, entry_hosts) in locations {
                if entry_hosts.is_empty() {
                    continue;
                }
                let (file, line) = parse_resource_location(location)?;

                let mut flagged: BTreeSet<String> = BTreeSet::new();
                hosts.append(entry_hosts, |node| {
                    let attributes = attributes_for(changes, title, location, &node.name);
                    flagged.extend(attributes.iter().cloned());
                    node.resource_changes.push(ResourceChange {
                        kind: kind.clone(),
                        title: title.clone(),
                        file: file.clone(),
                        line,
                        attributes,
                    });
                });
                // Hosts absent from all_nodes still contribute to the flat record.
                for host in entry_hosts {
                    flagged.extend(attributes_for(changes, title, location, host));
                }

                let attributes = changes
                    .attribute_issues
                    .keys()
                    .filter(|name| flagged.contains(*name))
                    .cloned()
                    .collect();
                records.push(ResourceChangeRecord {
                    change: ResourceChange {
                        kind: kind.clone(),
                        title: title.clone(),
                        file: file.clone(),
                        line,
                        attributes,
                    },
                    nodes: entry_hosts.clone(),
                });
            }
        }
    }
    Ok(records)
}

fn collect_edge_changes(edges: &EdgeChanges, hosts: &mut HostIndex) -> Result<Vec<EdgeChangeRecord>> {
    let mut records = Vec::new();
    for (source, targets) in &edges.added_edges {
        let (source_type, source_title) = parse_identifier(source)?.into_parts();
        for (target, edge_hosts) in targets {
            let (target_type, target_title) = parse_identifier(target)?.into_parts();
            let change = EdgeChange {
                edge: EdgeDirection::Added,
                source_type: source_type.clone(),
                source_title: source_title.clone(),
                target_type,
                target_title,
            };
            hosts.append(edge_hosts, |node| node.edge_changes.push(change.clone()));
            records.push(EdgeChangeRecord {
                change,
                nodes: edge_hosts.clone(),
            });
        }
    }
    Ok(records)
}
