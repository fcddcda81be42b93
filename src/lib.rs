//! preview-gate service.
//!
//! Receives GitHub webhooks, queues them, and verifies pull requests by
//! compiling catalogs for the hosts their manifest changes affect. The
//! domain model lives in `preview-core` and the job runtime in
//! `preview-ci`; this crate holds the process surface: CLI, configuration,
//! webhook listener and service wiring.

pub mod cli;
pub mod config;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod signature;

pub use cli::Args;
pub use config::Config;
pub use config::ConfigError;
