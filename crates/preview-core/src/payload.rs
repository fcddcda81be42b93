//! Typed views over GitHub webhook bodies.
//!
//! Only the fields the verification pipeline reads are modelled; everything
//! else in the payload is ignored.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;

use crate::constants::PING_EVENT_TYPE;
use crate::constants::PULL_REQUEST_EVENT_TYPE;
use crate::constants::VERIFIED_PULL_REQUEST_ACTIONS;
use crate::error::PayloadDecodeSnafu;
use crate::error::Result;

/// A branch reference on either side of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    /// Branch name.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Commit the branch points at.
    pub sha: String,
}

/// The `pull_request` object of a pull request event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// The `repository` object of a webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    /// `owner/name`, used for API paths.
    pub full_name: String,
    /// SSH clone URL, used for deployment and record stamps.
    pub ssh_url: String,
    #[serde(default)]
    pub clone_url: Option<String>,
}

/// Body of a `pull_request` webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestPayload {
    /// What happened to the pull request (`opened`, `synchronize`, ...).
    pub action: String,
    /// Pull request number.
    pub number: u64,
    pub pull_request: PullRequestDetails,
    pub repository: Repository,
}

impl PullRequestPayload {
    /// Decode from an event body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::PayloadDecode`] if a required field is
    /// missing or mistyped.
    pub fn from_value(body: &serde_json::Value) -> Result<Self> {
        Self::deserialize(body).context(PayloadDecodeSnafu {
            event_type: PULL_REQUEST_EVENT_TYPE,
        })
    }

    /// Whether this action should start a verification run.
    pub fn triggers_verification(&self) -> bool {
        VERIFIED_PULL_REQUEST_ACTIONS.contains(&self.action.as_str())
    }

    /// Base branch name.
    pub fn base_ref(&self) -> &str {
        &self.pull_request.base.ref_name
    }

    /// Head branch name.
    pub fn head_ref(&self) -> &str {
        &self.pull_request.head.ref_name
    }

    /// Commit the status is reported against.
    pub fn head_sha(&self) -> &str {
        &self.pull_request.head.sha
    }
}

/// Body of a `ping` webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    #[serde(default)]
    pub zen: Option<String>,
    #[serde(default)]
    pub hook_id: Option<u64>,
}

impl PingPayload {
    /// Decode from an event body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::PayloadDecode`] if the body is not an object.
    pub fn from_value(body: &serde_json::Value) -> Result<Self> {
        Self::deserialize(body).context(PayloadDecodeSnafu {
            event_type: PING_EVENT_TYPE,
        })
    }
}
