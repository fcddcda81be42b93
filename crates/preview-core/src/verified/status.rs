//! Commit status text.
//!
//! # Tiger Style
//!
//! - Descriptions never exceed `MAX_STATUS_DESCRIPTION_CHARS`
//! - Truncation counts characters, never splitting a code point

use uuid::Uuid;

use crate::constants::MAX_STATUS_DESCRIPTION_CHARS;
use crate::constants::TARGET_URL_MESSAGE_ID_PLACEHOLDER;

/// Suffix appended to truncated descriptions.
const TRUNCATION_MARKER: &str = "...";

/// Description reported while a run is in progress.
pub const PENDING_DESCRIPTION: &str = "Compiling catalogs for affected nodes";

/// Description reported when no host is affected by a change.
pub const NO_AFFECTED_NODES_DESCRIPTION: &str = "No nodes affected by this change";

/// Bound a description to the status API limit.
///
/// # Example
///
/// ```
/// use preview_core::verified::truncate_description;
///
/// assert_eq!(truncate_description("short"), "short");
///
/// let long = "x".repeat(200);
/// let truncated = truncate_description(&long);
/// assert_eq!(truncated.chars().count(), 140);
/// assert!(truncated.ends_with("..."));
/// ```
pub fn truncate_description(description: &str) -> String {
    if description.chars().count() <= MAX_STATUS_DESCRIPTION_CHARS {
        return description.to_string();
    }
    let keep = MAX_STATUS_DESCRIPTION_CHARS - TRUNCATION_MARKER.len();
    let mut out: String = description.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Render the status link for a run.
///
/// # Example
///
/// ```
/// use preview_core::verified::render_target_url;
/// use uuid::Uuid;
///
/// let url = render_target_url(Some("https://kibana/app?q={message_id}"), Uuid::nil());
/// assert_eq!(url.as_deref(), Some("https://kibana/app?q=00000000-0000-0000-0000-000000000000"));
/// assert_eq!(render_target_url(None, Uuid::nil()), None);
/// ```
pub fn render_target_url(template: Option<&str>, message_id: Uuid) -> Option<String> {
    template
        .filter(|t| !t.is_empty())
        .map(|t| t.replace(TARGET_URL_MESSAGE_ID_PLACEHOLDER, &message_id.to_string()))
}

/// Description for a run whose hosts all compiled.
///
/// # Example
///
/// ```
/// use preview_core::verified::success_description;
///
/// assert_eq!(success_description(3), "All 3 affected nodes compiled successfully");
/// ```
pub fn success_description(node_count: u64) -> String {
    format!("All {node_count} affected nodes compiled successfully")
}

/// Description for a run where some hosts failed to compile.
///
/// # Example
///
/// ```
/// use preview_core::verified::failure_description;
///
/// assert_eq!(failure_description(2, 5), "2 of 5 affected nodes failed to compile");
/// ```
pub fn failure_description(failure_count: u64, node_count: u64) -> String {
    format!("{failure_count} of {node_count} affected nodes failed to compile")
}

/// Description for a run that could not complete.
pub fn error_description(reason: &str) -> String {
    truncate_description(&format!("Verification could not complete: {reason}"))
}
