//! Fixed values shared across the preview pipeline.
//!
//! Tiger Style: every bound is explicit and compile-time constant.

/// Token that replaces a host's literal name inside compilation error messages.
pub const NODE_PLACEHOLDER: &str = "<node>";

/// File extension of manifests that can affect a host's catalog.
pub const MANIFEST_EXTENSION: &str = ".pp";

/// Prefix for the candidate environment deployed for a pull request.
pub const CANDIDATE_ENVIRONMENT_PREFIX: &str = "pr_";

/// Maximum length of a commit status description accepted by GitHub.
pub const MAX_STATUS_DESCRIPTION_CHARS: usize = 140;

/// Placeholder in the status target URL template replaced by the message id.
pub const TARGET_URL_MESSAGE_ID_PLACEHOLDER: &str = "{message_id}";

/// Pull request actions that start a verification run.
pub const VERIFIED_PULL_REQUEST_ACTIONS: [&str; 3] = ["opened", "reopened", "synchronize"];

/// Event type string GitHub uses for pull request webhooks.
pub const PULL_REQUEST_EVENT_TYPE: &str = "pull_request";

/// Event type string GitHub uses when a webhook is first configured.
pub const PING_EVENT_TYPE: &str = "ping";
