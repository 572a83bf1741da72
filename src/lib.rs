//! # Fixture Env
//!
//! Disposable service containers and database state reconciliation for
//! integration test fixtures.
//!
//! A fixture environment is one container (Oracle XE, Couchbase, or anything
//! with a published TCP port) plus, optionally, the database objects a test
//! suite creates inside it. Set-up converges the daemon onto a freshly
//! started, reachable container; tear-down drops the database objects and
//! removes the container, succeeding even when some of them never existed.
//!
//! ## Architecture Overview
//!
//! - **[`retry`]**: Bounded retry with an injectable clock, used by every wait
//! - **[`container`]**: Image presence, create, start, readiness, and removal
//!   of one named container against a [`container::DaemonClient`]
//! - **[`database`]**: Engine abstraction over a SQL connection, with the
//!   Oracle session reaper and teardown orchestrator
//! - **[`environment`]**: TOML environment definitions and the set-up /
//!   tear-down driver tying containers and databases together
//! - **[`config`]**: Process configuration read once from the environment
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fixture_env::config::FixtureConfig;
//! use fixture_env::container::{DockerDaemon, PortAllocator};
//! use fixture_env::environment::{EnvironmentBuilder, EnvironmentDefinition};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FixtureConfig::from_env()?;
//!     let daemon = DockerDaemon::connect(&config.daemon).await?;
//!     let allocator = PortAllocator::new(config.port_overrides.clone());
//!
//!     let mut builder = EnvironmentBuilder::new(
//!         EnvironmentDefinition::couchbase(),
//!         Arc::new(daemon),
//!         &allocator,
//!         &config.daemon.probe_host,
//!     )?;
//!
//!     let report = builder.set_up().await?;
//!     println!("Container {} is ready", report.container_id);
//!
//!     builder.tear_down().await?;
//!     Ok(())
//! }
//! ```

/// Bounded retry policies and the clock they sleep on.
pub mod retry;

/// Process-level configuration.
///
/// Reads the daemon location, probe host, and port overrides from the
/// environment exactly once.
pub mod config;

/// Container daemon client and the single-container lifecycle manager.
pub mod container;

/// Database engines, SQL execution seam, and Oracle teardown.
pub mod database;

/// Environment definitions and the set-up / tear-down driver.
pub mod environment;

/// Environment constants.
///
/// Centralizes variable names, definition file locations, and service
/// images and ports.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use config::{ConfigError, FixtureConfig};
pub use container::{ContainerLifecycleManager, DaemonClient, DockerDaemon, PortAllocator};
pub use database::{DatabaseConfig, DatabaseEngine, SqlExecutor, TeardownSummary};
pub use environment::{EnvironmentBuilder, EnvironmentDefinition};
pub use retry::{BoundedRetry, RetryError, RetryPolicy};
