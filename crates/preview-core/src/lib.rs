//! Core domain types for pull-request catalog preview verification.
//!
//! This crate holds everything that can be computed without touching the
//! network, a process, or the clock:
//!
//! - **Events**: the webhook envelope queued by the listener ([`event`])
//! - **Payloads**: typed views over GitHub webhook bodies ([`payload`])
//! - **Reports**: the raw `puppet preview` overview report ([`report`])
//! - **Records**: the normalized documents handed to the bulk sink ([`records`])
//! - **Normalization**: report -> records ([`normalize`])
//! - **Index naming**: time-based sink index templates ([`index`])
//! - **Verified helpers**: small pure functions shared by the runtime ([`verified`])
//!
//! # Normalization flow
//!
//! ```text
//! CompilationReport ──normalize()──> NormalizedReport
//!   all_nodes                          summary            (1)
//!   preview.compilation_errors  ──┐    nodes              (1 per host)
//!   preview.warning_count_...     ├──> errors             (deduplicated)
//!   changes.resource_type_...     │    warnings           (1 per issue code)
//!   changes.edge_changes        ──┘    resource_changes / edge_changes
//! ```
//!
//! Every produced record is stamped with the job's [`records::Stamp`].

pub mod constants;
pub mod error;
pub mod event;
pub mod identifier;
pub mod index;
pub mod normalize;
pub mod payload;
pub mod records;
pub mod report;
pub mod verified;

pub use error::CoreError;
pub use error::Result;
pub use event::Event;
pub use event::EventKind;
pub use identifier::ResourceRef;
pub use identifier::parse_identifier;
pub use index::IndexTemplate;
pub use normalize::JobContext;
pub use normalize::normalize;
pub use payload::PingPayload;
pub use payload::PullRequestPayload;
pub use records::NormalizedReport;
pub use records::RecordKind;
pub use records::Stamp;
pub use records::Stamped;
pub use report::CompilationReport;
