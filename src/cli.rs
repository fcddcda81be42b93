//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Verifies pull requests by compiling catalogs for the hosts they affect.
#[derive(Parser, Debug, Clone)]
#[command(name = "preview-gate", version)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long, default_value = "/etc/preview-gate.toml", env = "PREVIEW_GATE_CONFIG")]
    pub config: PathBuf,

    /// Puppet executable used to discover PuppetDB settings.
    #[arg(short = 'p', long, default_value = "/opt/puppetlabs/bin/puppet")]
    pub puppet: String,

    /// Minimum level for this service's own log lines.
    #[arg(short = 'l', long, default_value = "warn")]
    pub log_level: String,

    /// Minimum level for HTTP and runtime libraries.
    #[arg(long, default_value = "warn")]
    pub internal_log_level: String,

    /// Listen address, overriding `server.listen`.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Stop after the queue has been idle this many seconds.
    #[arg(long)]
    pub idle_shutdown_secs: Option<u64>,
}

/// Crates logged at `--log-level`.
const SERVICE_TARGETS: &[&str] = &["preview_gate", "preview_ci", "preview_core"];

/// Crates logged at `--internal-log-level`.
const INTERNAL_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "axum", "tower", "h2", "rustls"];

impl Args {
    /// `EnvFilter` directives for the configured levels.
    pub fn log_directives(&self) -> String {
        let service = SERVICE_TARGETS.iter().map(|t| format!("{t}={}", self.log_level.to_lowercase()));
        let internal = INTERNAL_TARGETS.iter().map(|t| format!("{t}={}", self.internal_log_level.to_lowercase()));
        std::iter::once("warn".to_string()).chain(service).chain(internal).collect::<Vec<_>>().join(",")
    }
}
