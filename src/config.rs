//! Service configuration.
//!
//! Loaded from a TOML file where every key has a default, then adjusted
//! from the environment and, for PuppetDB settings left empty, from the
//! local Puppet installation.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [puppetdb]
//! base_uri = "https://puppetdb.example.com:8081"
//!
//! [elasticsearch]
//! host = "localhost"
//! port = 9200
//! index = "preview-gate-{isoyear}.{isoweek:02d}"
//!
//! [github]
//! auth_token = "..."
//! target_url = "https://kibana.example.com/app/discover#/?q={message_id}"
//!
//! [executables]
//! puppet = "puppet"
//! deploy = "/opt/puppetlabs/puppet/bin/armature"
//! deploy_args = ["deploy-branch", "{repository}", "{ref}", "{environment}"]
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use preview_ci::constants::DEFAULT_MAX_CONCURRENT_JOBS;
use preview_ci::constants::DEFAULT_STATUS_CONTEXT;
use preview_ci::constants::MAX_CONCURRENT_JOBS;
use preview_ci::puppetdb::PuppetDbTls;
use preview_core::IndexTemplate;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;
use tracing::debug;
use tracing::info;

/// Environment variable overriding `github.auth_token`.
pub const GITHUB_TOKEN_ENV: &str = "PREVIEW_GATE_GITHUB_TOKEN";

/// Environment variable overriding `github.webhook_secret`.
pub const WEBHOOK_SECRET_ENV: &str = "PREVIEW_GATE_WEBHOOK_SECRET";

/// Default values for configuration
mod defaults {
    use std::net::SocketAddr;

    use super::DEFAULT_MAX_CONCURRENT_JOBS;
    use super::DEFAULT_STATUS_CONTEXT;

    // Network defaults
    pub fn listen() -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], 8080))
    }
    pub fn github_api_url() -> String {
        "https://api.github.com".to_string()
    }
    pub fn status_context() -> String {
        DEFAULT_STATUS_CONTEXT.to_string()
    }

    // Sink defaults
    pub fn elasticsearch_host() -> String {
        "localhost".to_string()
    }
    pub fn elasticsearch_port() -> u16 {
        9200
    }
    pub fn elasticsearch_index() -> String {
        "preview-gate".to_string()
    }

    // Executable defaults
    pub fn puppet() -> String {
        "puppet".to_string()
    }
    pub fn deploy() -> String {
        "/opt/puppetlabs/puppet/bin/armature".to_string()
    }
    pub fn deploy_args() -> Vec<String> {
        ["deploy-branch", "{repository}", "{ref}", "{environment}"].into_iter().map(String::from).collect()
    }

    // Worker defaults
    pub fn max_concurrent_jobs() -> usize {
        DEFAULT_MAX_CONCURRENT_JOBS
    }
    pub fn request_timeout_secs() -> u64 {
        60
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[snafu(display("failed to read configuration file {}: {source}", path.display()))]
    ReadConfig { path: PathBuf, source: std::io::Error },

    /// The configuration file is not valid TOML for this schema.
    #[snafu(display("failed to parse configuration file {}: {source}", path.display()))]
    ParseConfig { path: PathBuf, source: toml::de::Error },

    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: {reason}"))]
    InvalidValue { key: &'static str, reason: String },

    /// Asking the Puppet installation for a default failed.
    #[snafu(display("failed to discover {key} from {puppet}: {reason}"))]
    Discovery {
        key: &'static str,
        puppet: String,
        reason: String,
    },
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the webhook listener binds.
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
        }
    }
}

/// PuppetDB connection settings. Empty values are discovered from Puppet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuppetDbConfig {
    #[serde(default)]
    pub base_uri: String,
    #[serde(default)]
    pub ssl_host_key: Option<PathBuf>,
    #[serde(default)]
    pub ssl_host_cert: Option<PathBuf>,
    #[serde(default)]
    pub ssl_ca_cert: Option<PathBuf>,
}

impl PuppetDbConfig {
    /// Client certificate material, when all three paths are set.
    pub fn tls(&self) -> Option<PuppetDbTls> {
        match (&self.ssl_host_key, &self.ssl_host_cert, &self.ssl_ca_cert) {
            (Some(host_key), Some(host_cert), Some(ca_cert)) => Some(PuppetDbTls {
                host_key: host_key.clone(),
                host_cert: host_cert.clone(),
                ca_cert: ca_cert.clone(),
            }),
            _ => None,
        }
    }
}

/// Bulk sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "defaults::elasticsearch_host")]
    pub host: String,
    #[serde(default = "defaults::elasticsearch_port")]
    pub port: u16,
    /// Index name template, see [`IndexTemplate`].
    #[serde(default = "defaults::elasticsearch_index")]
    pub index: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            host: defaults::elasticsearch_host(),
            port: defaults::elasticsearch_port(),
            index: defaults::elasticsearch_index(),
        }
    }
}

/// GitHub settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "defaults::github_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "defaults::status_context")]
    pub status_context: String,
    /// Shared secret for `X-Hub-Signature-256`. Empty disables verification.
    #[serde(default)]
    pub webhook_secret: String,
    /// Status link with an optional `{message_id}` placeholder.
    #[serde(default)]
    pub target_url: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::github_api_url(),
            auth_token: String::new(),
            status_context: defaults::status_context(),
            webhook_secret: String::new(),
            target_url: None,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("auth_token", &if self.auth_token.is_empty() { "" } else { "<redacted>" })
            .field("status_context", &self.status_context)
            .field("webhook_secret", &if self.webhook_secret.is_empty() { "" } else { "<redacted>" })
            .field("target_url", &self.target_url)
            .finish()
    }
}

/// External programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutablesConfig {
    #[serde(default = "defaults::puppet")]
    pub puppet: String,
    #[serde(default = "defaults::deploy")]
    pub deploy: String,
    /// Deploy arguments with `{ref}`, `{environment}` and `{repository}` placeholders.
    #[serde(default = "defaults::deploy_args")]
    pub deploy_args: Vec<String>,
}

impl Default for ExecutablesConfig {
    fn default() -> Self {
        Self {
            puppet: defaults::puppet(),
            deploy: defaults::deploy(),
            deploy_args: defaults::deploy_args(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Passed to `puppet preview --excludes` when set.
    #[serde(default)]
    pub excludes_file: Option<PathBuf>,
}

/// Job processing limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "defaults::max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Timeout for GitHub and PuppetDB requests.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::max_concurrent_jobs(),
            request_timeout_secs: defaults::request_timeout_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub puppetdb: PuppetDbConfig,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub executables: ExecutablesConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    /// Parse configuration text.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text).context(ParseConfigSnafu { path })?;
        config.normalize_empty_paths();
        Ok(config)
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "loading configuration");
                Self::from_toml(&text, path)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "configuration file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::ReadConfig {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Apply environment overrides for secrets.
    pub fn apply_env(&mut self) {
        self.apply_overrides(std::env::var(GITHUB_TOKEN_ENV).ok(), std::env::var(WEBHOOK_SECRET_ENV).ok());
    }

    fn apply_overrides(&mut self, token: Option<String>, secret: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            debug!(var = GITHUB_TOKEN_ENV, "GitHub token taken from environment");
            self.github.auth_token = token;
        }
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            debug!(var = WEBHOOK_SECRET_ENV, "webhook secret taken from environment");
            self.github.webhook_secret = secret;
        }
    }

    // Treat `key = ""` the same as an absent key.
    fn normalize_empty_paths(&mut self) {
        for path in [
            &mut self.puppetdb.ssl_host_key,
            &mut self.puppetdb.ssl_host_cert,
            &mut self.puppetdb.ssl_ca_cert,
            &mut self.preview.excludes_file,
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                *path = None;
            }
        }
        if self.github.target_url.as_deref() == Some("") {
            self.github.target_url = None;
        }
    }

    /// Fill empty PuppetDB settings from the local Puppet installation.
    pub fn discover_puppetdb(&mut self, puppet: &str) -> Result<(), ConfigError> {
        if self.puppetdb.base_uri.is_empty() {
            let confdir = puppet_config_print(puppet, "confdir")?;
            let conf_path = Path::new(&confdir).join("puppetdb.conf");
            debug!(path = %conf_path.display(), "loading default PuppetDB config");
            let text = std::fs::read_to_string(&conf_path).context(ReadConfigSnafu { path: conf_path.clone() })?;
            self.puppetdb.base_uri = first_server_url(&text).ok_or_else(|| ConfigError::Discovery {
                key: "puppetdb.base_uri",
                puppet: puppet.to_string(),
                reason: format!("no server_urls in [main] of {}", conf_path.display()),
            })?;
        }
        if self.puppetdb.ssl_host_key.is_none() {
            self.puppetdb.ssl_host_key = Some(puppet_config_print(puppet, "hostprivkey")?.into());
        }
        if self.puppetdb.ssl_host_cert.is_none() {
            self.puppetdb.ssl_host_cert = Some(puppet_config_print(puppet, "hostcert")?.into());
        }
        if self.puppetdb.ssl_ca_cert.is_none() {
            self.puppetdb.ssl_ca_cert = Some(puppet_config_print(puppet, "localcacert")?.into());
        }
        Ok(())
    }

    /// Check values that would otherwise fail at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.index_template()?;

        if self.puppetdb.base_uri.is_empty() {
            return InvalidValueSnafu {
                key: "puppetdb.base_uri",
                reason: "must be set or discoverable from puppetdb.conf",
            }
            .fail();
        }
        if !(1..=MAX_CONCURRENT_JOBS).contains(&self.worker.max_concurrent_jobs) {
            return InvalidValueSnafu {
                key: "worker.max_concurrent_jobs",
                reason: format!("must be between 1 and {MAX_CONCURRENT_JOBS}"),
            }
            .fail();
        }
        if self.worker.request_timeout_secs == 0 {
            return InvalidValueSnafu {
                key: "worker.request_timeout_secs",
                reason: "must be greater than zero",
            }
            .fail();
        }
        if self.executables.puppet.is_empty() || self.executables.deploy.is_empty() {
            return InvalidValueSnafu {
                key: "executables",
                reason: "puppet and deploy must be set",
            }
            .fail();
        }
        Ok(())
    }

    /// The parsed sink index template.
    pub fn index_template(&self) -> Result<IndexTemplate, ConfigError> {
        IndexTemplate::parse(&self.elasticsearch.index).map_err(|e| ConfigError::InvalidValue {
            key: "elasticsearch.index",
            reason: e.to_string(),
        })
    }
}

/// Run `puppet config print <key>`.
fn puppet_config_print(puppet: &str, key: &'static str) -> Result<String, ConfigError> {
    let discovery = |reason: String| ConfigError::Discovery {
        key,
        puppet: puppet.to_string(),
        reason,
    };
    let output = std::process::Command::new(puppet)
        .args(["config", "print", key])
        .output()
        .map_err(|e| discovery(e.to_string()))?;
    if !output.status.success() {
        return Err(discovery(String::from_utf8_lossy(&output.stderr).trim().to_string()));
    }
    let value = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if value.is_empty() {
        return Err(discovery("empty output".to_string()));
    }
    debug!(key, value = %value, "discovered Puppet setting");
    Ok(value)
}

/// First entry of `server_urls` in the `[main]` section of a puppetdb.conf.
pub fn first_server_url(puppetdb_conf: &str) -> Option<String> {
    let mut in_main = false;
    for line in puppetdb_conf.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_main = section.trim() == "main";
            continue;
        }
        if !in_main {
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        if key.trim() == "server_urls" {
            return value.split(',').map(str::trim).find(|url| !url.is_empty()).map(String::from);
        }
    }
    None
}
