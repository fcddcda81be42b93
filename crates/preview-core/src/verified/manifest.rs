//! Changed-file filtering and host discovery queries.
//!
//! # Tiger Style
//!
//! - Query text is built from escaped input only
//! - No I/O or system calls

use crate::constants::MANIFEST_EXTENSION;

/// Whether a changed file is a manifest that can affect a catalog.
///
/// # Example
///
/// ```
/// use preview_core::verified::is_manifest_path;
///
/// assert!(is_manifest_path("modules/motd/manifests/init.pp"));
/// assert!(!is_manifest_path("modules/motd/templates/motd.erb"));
/// assert!(!is_manifest_path("README.pp.md"));
/// ```
#[inline]
pub fn is_manifest_path(path: &str) -> bool {
    path.ends_with(MANIFEST_EXTENSION)
}

/// Escape text for use inside a double-quoted query string literal.
fn quote_query_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the query listing active hosts with a resource declared in any of
/// the changed manifests.
///
/// Non-manifest paths are ignored. Returns `None` when no manifest changed,
/// in which case no host can be affected and no query should be sent.
///
/// # Example
///
/// ```
/// use preview_core::verified::build_affected_nodes_query;
///
/// let query = build_affected_nodes_query(["site.pp", "README.md"]).unwrap();
/// assert_eq!(
///     query,
///     r#"nodes[certname] { resources { (file ~ "^.*site\\.pp$") } and deactivated is null and expired is null }"#,
/// );
///
/// assert!(build_affected_nodes_query(["README.md"]).is_none());
/// ```
pub fn build_affected_nodes_query<'a>(paths: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let clauses: Vec<String> = paths
        .into_iter()
        .filter(|path| is_manifest_path(path))
        .map(|path| {
            let pattern = format!("^.*{}$", regex::escape(path));
            format!("(file ~ \"{}\")", quote_query_string(&pattern))
        })
        .collect();

    if clauses.is_empty() {
        return None;
    }

    Some(format!(
        "nodes[certname] {{ resources {{ {} }} and deactivated is null and expired is null }}",
        clauses.join(" or ")
    ))
}
