//! Service wiring.
//!
//! Builds the production collaborators and handler registry from
//! configuration, then runs the listener and dispatcher until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use preview_ci::CollaboratorFactory;
use preview_ci::Dispatcher;
use preview_ci::HandlerRegistry;
use preview_ci::JobQueue;
use preview_ci::OrchestratorConfig;
use preview_ci::PingHandler;
use preview_ci::PullRequestHandler;
use preview_ci::ServiceCollaborators;
use preview_ci::elasticsearch::ElasticsearchSink;
use preview_ci::github::GitHubClient;
use preview_ci::process::CommandDeployer;
use preview_ci::process::PuppetPreview;
use preview_ci::puppetdb::PuppetDbClient;
use preview_core::EventKind;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::server::ListenerState;
use crate::server::router;
use crate::shutdown::shutdown_signal;
use crate::shutdown::wait_for_shutdown;
use crate::signature::SignatureVerifier;

/// Build the collaborators every job shares.
pub fn build_collaborators(config: &Config) -> Result<ServiceCollaborators> {
    let timeout = config.worker.request_timeout();

    let github = GitHubClient::new(
        config.github.api_url.clone(),
        Some(config.github.auth_token.clone()),
        config.github.status_context.clone(),
        timeout,
    )
    .context("failed to build GitHub client")?;

    let puppetdb = PuppetDbClient::new(&config.puppetdb.base_uri, config.puppetdb.tls().as_ref(), timeout)
        .context("failed to build PuppetDB client")?;

    let deployer = CommandDeployer::new(config.executables.deploy.clone(), config.executables.deploy_args.clone());
    let compiler = PuppetPreview::new(config.executables.puppet.clone(), config.preview.excludes_file.clone());

    let sink = ElasticsearchSink::new(&config.elasticsearch.host, config.elasticsearch.port, timeout)
        .context("failed to build Elasticsearch client")?;

    Ok(ServiceCollaborators::new(github, puppetdb, deployer, compiler, sink))
}

/// Register the handlers for every event kind the service acts on.
pub fn build_registry(factory: Arc<dyn CollaboratorFactory>, config: &Config) -> Result<HandlerRegistry> {
    let orchestrator_config =
        OrchestratorConfig::new(config.index_template()?).with_target_url(config.github.target_url.clone());

    let registry = HandlerRegistry::builder()
        .register(
            EventKind::PullRequest,
            Arc::new(PullRequestHandler::new(factory, Arc::new(orchestrator_config))),
        )?
        .register(EventKind::Ping, Arc::new(PingHandler))?
        .build();
    Ok(registry)
}

/// Serve webhooks until shutdown, then drain the queue.
pub async fn run(config: Config, registry: HandlerRegistry, idle_after: Option<Duration>) -> Result<()> {
    let listen = config.server.listen;
    let (queue, receiver) = JobQueue::new();

    let dispatcher = Arc::new(Dispatcher::new(registry).with_max_concurrent_jobs(config.worker.max_concurrent_jobs));
    let abort = CancellationToken::new();
    let dispatcher_task = tokio::spawn(Arc::clone(&dispatcher).run(receiver, abort.clone()));

    let verifier = SignatureVerifier::new(&config.github.webhook_secret);
    if verifier.is_none() {
        warn!("no webhook secret configured, signatures are not verified");
    }
    let app = router(ListenerState::new(queue.clone(), verifier));

    let listener = tokio::net::TcpListener::bind(listen).await.with_context(|| format!("failed to bind {listen}"))?;
    info!(%listen, "webhook listener started");

    let shutdown = wait_for_shutdown(queue.clone(), idle_after);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown.await;
            info!(?reason, "stopping webhook listener");
        })
        .await
        .context("webhook listener failed")?;

    // The listener's state is gone; dropping the last sender lets the
    // dispatcher drain what is queued and exit.
    let outstanding = queue.outstanding();
    drop(queue);
    info!(outstanding, "draining job queue");

    // A second signal aborts in-flight jobs.
    let hard_stop = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("second shutdown signal, cancelling in-flight jobs");
        abort.cancel();
    });

    dispatcher_task.await.context("dispatcher task panicked")?;
    hard_stop.abort();
    info!("service shut down");
    Ok(())
}
