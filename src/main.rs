//! preview-gate binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use preview_gate::Args;
use preview_gate::Config;
use preview_gate::service;
use tracing::debug;
use tracing::info;

/// Initialize tracing subscriber with environment-based filtering.
///
/// `RUST_LOG` takes precedence over the CLI levels.
fn init_tracing(args: &Args) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_directives()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config).context("failed to load configuration")?;
    config.apply_env();
    config.discover_puppetdb(&args.puppet).context("failed to discover PuppetDB settings")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    config.validate().context("invalid configuration")?;
    debug!(?config, "configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = load_config(&args)?;
    let collaborators = service::build_collaborators(&config)?;
    let registry = service::build_registry(Arc::new(collaborators), &config)?;

    info!(
        puppetdb = %config.puppetdb.base_uri,
        elasticsearch = %format!("{}:{}", config.elasticsearch.host, config.elasticsearch.port),
        max_concurrent_jobs = config.worker.max_concurrent_jobs,
        "starting preview-gate"
    );

    service::run(config, registry, args.idle_shutdown_secs.map(Duration::from_secs)).await
}
