//! Environment naming and deploy argument rendering.
//!
//! # Tiger Style
//!
//! - Output names only contain `[a-z0-9_]`
//! - No I/O or system calls

use crate::constants::CANDIDATE_ENVIRONMENT_PREFIX;

/// Placeholder for the git ref in deploy argument templates.
pub const DEPLOY_REF_PLACEHOLDER: &str = "{ref}";

/// Placeholder for the environment name in deploy argument templates.
pub const DEPLOY_ENVIRONMENT_PLACEHOLDER: &str = "{environment}";

/// Placeholder for the repository in deploy argument templates.
pub const DEPLOY_REPOSITORY_PLACEHOLDER: &str = "{repository}";

/// Map a branch name onto a valid environment name.
///
/// ASCII letters are lowercased; every character outside `[a-z0-9_]`
/// becomes `_`.
///
/// # Example
///
/// ```
/// use preview_core::verified::sanitize_environment_name;
///
/// assert_eq!(sanitize_environment_name("production"), "production");
/// assert_eq!(sanitize_environment_name("Feature/MOTD-v2"), "feature_motd_v2");
/// ```
pub fn sanitize_environment_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Name of the environment a pull request's head is deployed into.
///
/// # Example
///
/// ```
/// use preview_core::verified::candidate_environment_name;
///
/// assert_eq!(candidate_environment_name(42), "pr_42");
/// ```
pub fn candidate_environment_name(pull_request: u64) -> String {
    format!("{CANDIDATE_ENVIRONMENT_PREFIX}{pull_request}")
}

/// Substitute `{ref}`, `{environment}` and `{repository}` in each argument.
///
/// # Example
///
/// ```
/// use preview_core::verified::render_deploy_args;
///
/// let template = vec!["deploy".to_string(), "{repository}".to_string(), "{ref}:{environment}".to_string()];
/// assert_eq!(
///     render_deploy_args(&template, "main", "production", "git@host:ops.git"),
///     vec!["deploy", "git@host:ops.git", "main:production"],
/// );
/// ```
pub fn render_deploy_args(template: &[String], git_ref: &str, environment: &str, repository: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace(DEPLOY_REF_PLACEHOLDER, git_ref)
                .replace(DEPLOY_ENVIRONMENT_PLACEHOLDER, environment)
                .replace(DEPLOY_REPOSITORY_PLACEHOLDER, repository)
        })
        .collect()
}
