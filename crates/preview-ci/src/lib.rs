//! Job queue, dispatcher and verification orchestrator.
//!
//! Webhook events enter an ordered [`JobQueue`]. The [`Dispatcher`]
//! consumes it, routing each event through an immutable
//! [`HandlerRegistry`]. The pull request handler runs a
//! [`VerificationOrchestrator`] that talks to the outside world only
//! through the traits in [`collaborators`].
//!
//! # Architecture
//!
//! ```text
//! QueueSender ──> JobQueue ──> Dispatcher ──> HandlerRegistry
//!                                                 │
//!                                   PullRequestHandler / PingHandler
//!                                                 │
//!                                    VerificationOrchestrator
//!                      ┌──────────┬──────────┬────┴─────┬──────────┐
//!                   GitHub    PuppetDB    deploy     preview   Elasticsearch
//! ```
//!
//! # Job lifecycle
//!
//! `Created -> Pending -> DiscoveringAndDeploying -> Compiling ->
//! Normalizing -> Submitting -> Succeeded | Failed`, with `Errored`
//! reachable from every non-terminal state.

pub mod adapters;
pub mod collaborators;
pub mod constants;
pub mod dispatcher;
pub mod elasticsearch;
pub mod error;
pub mod github;
pub mod handlers;
pub mod orchestrator;
pub mod process;
pub mod puppetdb;
pub mod queue;

pub use adapters::ServiceCollaborators;
pub use collaborators::BulkSink;
pub use collaborators::ChangedFiles;
pub use collaborators::CollaboratorFactory;
pub use collaborators::CommitState;
pub use collaborators::EnvironmentDeployer;
pub use collaborators::HostDiscovery;
pub use collaborators::JobCollaborators;
pub use collaborators::PreviewCompiler;
pub use collaborators::RejectedDocument;
pub use collaborators::SinkDocument;
pub use collaborators::StatusReporter;
pub use collaborators::StatusUpdate;
pub use collaborators::SubmitOutcome;
pub use dispatcher::DispatchOutcome;
pub use dispatcher::Dispatcher;
pub use dispatcher::HandlerRegistry;
pub use error::PreviewError;
pub use error::Result;
pub use handlers::EventHandler;
pub use handlers::PingHandler;
pub use handlers::PullRequestHandler;
pub use orchestrator::JobOutcome;
pub use orchestrator::JobState;
pub use orchestrator::OrchestratorConfig;
pub use orchestrator::VerificationJob;
pub use orchestrator::VerificationOrchestrator;
pub use queue::JobQueue;
pub use queue::QueueClosed;
pub use queue::QueueReceiver;
pub use queue::QueueSender;
