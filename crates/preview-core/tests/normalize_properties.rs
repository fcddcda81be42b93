//! Property-based tests for report normalization.
//!
//! Tests cover invariants for:
//! - Error deduplication after host-name substitution
//! - Host records referencing only flat records that name them
//! - Resource change cross-references
//! - Stamp consistency across record kinds
//! - Identifier parsing
//!
//! # Tiger Style
//!
//! - All tests use bounded inputs from generators
//! - Pure: no I/O, no clock reads inside normalization

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::TimeZone;
use chrono::Utc;
use preview_core::JobContext;
use preview_core::normalize;
use preview_core::parse_identifier;
use preview_core::report::AttributeIssue;
use preview_core::report::CompilationError;
use preview_core::report::CompilationErrorGroup;
use preview_core::report::CompilationReport;
use preview_core::report::HostOutcome;
use preview_core::report::ResourceTypeChanges;
use proptest::prelude::*;
use serde_json::Map;
use uuid::Uuid;

// =============================================================================
// Generators
// =============================================================================

fn host_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("host[0-9]{1,3}\\.example\\.com", 1..8).prop_map(|set| set.into_iter().collect())
}

fn outcomes(names: &[String], errors: &[u64]) -> Vec<HostOutcome> {
    names
        .iter()
        .zip(errors.iter().cycle())
        .map(|(name, error_count)| HostOutcome {
            name: name.clone(),
            error_count: *error_count,
            extra: Map::new(),
        })
        .collect()
}

fn context() -> JobContext {
    JobContext {
        message_id: Uuid::from_u128(0x1234),
        pull_request: 9,
        base_environment: "production".to_string(),
        repository: "git@github.com:ops/puppet.git".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
    }
}

/// A report whose hosts each appear in some resource conflicts.
fn report_with_conflicts() -> impl Strategy<Value = CompilationReport> {
    (host_names(), prop::collection::vec(0u64..3, 1..4), 1usize..4, any::<u64>()).prop_map(
        |(names, errors, title_count, seed)| {
            let mut conflicts = BTreeMap::new();
            let mut attribute_issues = BTreeMap::new();
            for t in 0..title_count {
                let title = format!("/etc/file{t}");
                let location = format!("modules/m{t}/init.pp:{}", t + 1);
                let hosts: Vec<String> = names
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| (seed >> ((i + t) % 64)) & 1 == 1)
                    .map(|(_, n)| n.clone())
                    .collect();
                let mut by_location = BTreeMap::new();
                by_location.insert(location.clone(), hosts.clone());
                conflicts.insert(title.clone(), by_location.clone());

                let flagged: Vec<String> = hosts.iter().step_by(2).cloned().collect();
                let mut flagged_locations = BTreeMap::new();
                flagged_locations.insert(location, flagged);
                let issue = attribute_issues
                    .entry("mode".to_string())
                    .or_insert_with(AttributeIssue::default);
                issue.conflicting_in.insert(title, flagged_locations);
            }

            let mut report = CompilationReport {
                all_nodes: outcomes(&names, &errors),
                ..CompilationReport::default()
            };
            report.changes.resource_type_changes.insert("File".to_string(), ResourceTypeChanges {
                conflicting_resources: conflicts,
                attribute_issues,
            });
            report
        },
    )
}

// =============================================================================
// Error Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// With no compilation errors, no flat errors exist and no host gains any.
    #[test]
    fn test_no_compilation_errors_means_no_error_records(
        names in host_names(),
        errors in prop::collection::vec(0u64..5, 1..4),
    ) {
        let report = CompilationReport {
            all_nodes: outcomes(&names, &errors),
            ..CompilationReport::default()
        };

        let out = normalize(&report, &context()).unwrap();
        prop_assert!(out.errors.is_empty());
        prop_assert!(out.nodes.iter().all(|n| n.record.errors.is_empty()));
        prop_assert_eq!(
            out.summary.record.success_count + out.summary.record.failure_count,
            names.len() as u64
        );
    }

    /// Messages that differ only by host name collapse into one flat error.
    #[test]
    fn test_errors_equal_after_substitution_collapse(
        names in host_names(),
        template in "Could not find resource on [A-Z]{3} for ",
    ) {
        let group = CompilationErrorGroup {
            manifest: "site.pp".to_string(),
            nodes: names.clone(),
            errors: names
                .iter()
                .map(|host| CompilationError::new(format!("{template}{host}")))
                .collect(),
        };
        let mut report = CompilationReport {
            all_nodes: outcomes(&names, &[1]),
            ..CompilationReport::default()
        };
        report.preview.compilation_errors.push(group);

        let out = normalize(&report, &context()).unwrap();
        prop_assert_eq!(out.errors.len(), 1);
        prop_assert_eq!(&out.errors[0].record.nodes, &names);
        prop_assert_eq!(&out.errors[0].record.error.error.message, &format!("{template}<node>"));
        for node in &out.nodes {
            prop_assert_eq!(node.record.errors.len(), 1);
        }
    }
}

// =============================================================================
// Cross-Reference Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every host on a flat resource change has a matching per-host entry.
    #[test]
    fn test_flat_resource_hosts_have_node_entries(report in report_with_conflicts()) {
        let out = normalize(&report, &context()).unwrap();

        for flat in &out.resource_changes {
            for host in &flat.record.nodes {
                let node = out.nodes.iter().find(|n| &n.record.name == host).unwrap();
                let matched = node.record.resource_changes.iter().any(|c| {
                    c.kind == flat.record.change.kind
                        && c.title == flat.record.change.title
                        && c.file == flat.record.change.file
                        && c.line == flat.record.change.line
                });
                prop_assert!(matched, "{} lacks entry for {}", host, flat.record.change.title);
            }
        }
    }

    /// Host issue lists only reference flat records naming that host.
    #[test]
    fn test_node_entries_are_subset_of_flat_records(report in report_with_conflicts()) {
        let out = normalize(&report, &context()).unwrap();

        for node in &out.nodes {
            for change in &node.record.resource_changes {
                let flat = out.resource_changes.iter().find(|f| {
                    f.record.change.title == change.title && f.record.change.line == change.line
                });
                prop_assert!(flat.is_some());
                let flat = flat.unwrap();
                prop_assert!(flat.record.nodes.contains(&node.record.name));
                let flat_attrs: BTreeSet<_> = flat.record.change.attributes.iter().collect();
                prop_assert!(change.attributes.iter().all(|a| flat_attrs.contains(a)));
            }
        }
    }

    /// Every record of one normalization carries the same stamp.
    #[test]
    fn test_stamps_are_identical(report in report_with_conflicts()) {
        let ctx = context();
        let out = normalize(&report, &ctx).unwrap();
        let expected = ctx.stamp();
        prop_assert!(out.stamps().all(|stamp| *stamp == expected));
        prop_assert_eq!(out.stamps().count(), out.record_count());
    }
}

// =============================================================================
// Identifier Parsing
// =============================================================================

proptest! {
    /// Well-formed identifiers split into their parts.
    #[test]
    fn test_identifier_parts(kind in "[A-Z][a-z_:]{0,20}", title in "[^\\]\\[]{1,40}") {
        let parsed = parse_identifier(&format!("{kind}[{title}]")).unwrap();
        prop_assert_eq!(parsed.kind, kind);
        prop_assert_eq!(parsed.title, title);
    }

    /// Identifiers without a closing bracket never parse.
    #[test]
    fn test_identifier_without_close_fails(kind in "[A-Z][a-z]{0,10}", title in "[a-z/]{1,20}") {
        let wrong_bracket = format!("{kind}({title}]");
        let unclosed = format!("{kind}[{title}");
        prop_assert!(parse_identifier(&wrong_bracket).is_err());
        prop_assert!(parse_identifier(&unclosed).is_err());
    }
}
