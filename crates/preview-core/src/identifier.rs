//! Resource reference parsing.
//!
//! Edge endpoints in the preview report are written as `Kind[title]`,
//! e.g. `File[/etc/motd]` or `Class[Profile::Base]`.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::error::Result;

static RESOURCE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\[]+)\[([^\]]+)\]").expect("resource reference pattern is valid"));

/// A typed resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource type, e.g. `File`.
    pub kind: String,
    /// Resource title, e.g. `/etc/motd`.
    pub title: String,
}

impl ResourceRef {
    /// Split into `(kind, title)`.
    pub fn into_parts(self) -> (String, String) {
        (self.kind, self.title)
    }
}

impl FromStr for ResourceRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        parse_identifier(s)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.title)
    }
}

/// Parse a `Kind[title]` identifier.
///
/// The kind may not contain `[` and the title may not contain `]`; neither
/// may be empty.
///
/// # Errors
///
/// Returns [`CoreError::MalformedIdentifier`] when the brackets are missing
/// or out of order.
///
/// # Example
///
/// ```
/// use preview_core::parse_identifier;
///
/// let r = parse_identifier("File[/etc/motd]").unwrap();
/// assert_eq!(r.into_parts(), ("File".to_string(), "/etc/motd".to_string()));
///
/// assert!(parse_identifier("File(/etc/motd]").is_err());
/// ```
pub fn parse_identifier(input: &str) -> Result<ResourceRef> {
    let captures = RESOURCE_REF.captures(input).ok_or_else(|| CoreError::MalformedIdentifier {
        input: input.to_string(),
    })?;

    Ok(ResourceRef {
        kind: captures[1].to_string(),
        title: captures[2].to_string(),
    })
}
