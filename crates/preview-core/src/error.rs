//! Error types for the preview domain.
//!
//! Uses snafu for structured error handling with context.

use snafu::Snafu;

/// Result type for core operations.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Errors produced while decoding or normalizing preview data.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CoreError {
    /// A resource reference did not have the `Kind[title]` shape.
    #[snafu(display("malformed resource identifier: {input:?}"))]
    MalformedIdentifier {
        /// The offending identifier.
        input: String,
    },

    /// A `<a>:<b>` location string could not be split into its parts.
    #[snafu(display("malformed {what} location: {input:?}"))]
    MalformedLocation {
        /// Which report section the location came from.
        what: &'static str,
        /// The offending location string.
        input: String,
    },

    /// The sink index template could not be parsed.
    #[snafu(display("invalid index template {template:?}: {reason}"))]
    InvalidIndexTemplate {
        /// The template as configured.
        template: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The compilation report was not valid JSON of the expected shape.
    #[snafu(display("failed to decode compilation report: {source}"))]
    ReportDecode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A normalized record could not be encoded as a sink document.
    #[snafu(display("failed to encode {kind} record: {source}"))]
    RecordEncode {
        /// Record kind being encoded.
        kind: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A webhook payload was not valid JSON of the expected shape.
    #[snafu(display("failed to decode {event_type} payload: {source}"))]
    PayloadDecode {
        /// Event type being decoded.
        event_type: &'static str,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::MalformedIdentifier {
            input: "Type(Title]".to_string(),
        };
        assert!(err.to_string().contains("Type(Title]"));

        let err = CoreError::MalformedLocation {
            what: "warning",
            input: "12".to_string(),
        };
        assert!(err.to_string().contains("warning"));
        assert!(err.to_string().contains("\"12\""));
    }
}
