//! Runtime limits for verification runs.
//!
//! Tiger Style: every bound is explicit and compile-time constant.

use std::time::Duration;

/// Deadline for one bulk submission, connection included.
pub const SINK_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for GitHub and PuppetDB requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of jobs processed at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 1;

/// Upper bound on concurrently processed jobs.
pub const MAX_CONCURRENT_JOBS: usize = 64;

/// Maximum bytes of stderr kept from a failed process.
pub const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Maximum bytes read from the compiler's report output.
pub const MAX_REPORT_BYTES: usize = 256 * 1024 * 1024;

/// Time between SIGTERM and SIGKILL when stopping a process group.
pub const PROCESS_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Files requested per page when listing pull request files.
pub const CHANGED_FILES_PAGE_SIZE: usize = 100;

/// Upper bound on pages fetched when listing pull request files.
///
/// GitHub stops listing after 3000 files.
pub const MAX_CHANGED_FILES_PAGES: usize = 30;

/// Default status context shown on the pull request.
pub const DEFAULT_STATUS_CONTEXT: &str = "preview-gate";

/// User agent sent to GitHub, which rejects requests without one.
pub const USER_AGENT: &str = concat!("preview-gate/", env!("CARGO_PKG_VERSION"));
