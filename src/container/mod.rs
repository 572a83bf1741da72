//! Container provisioning for test fixtures.
//!
//! This module owns one container per logical environment: it makes sure the
//! image is present, clears away any container left behind by an earlier run,
//! creates and starts a fresh one, and waits until the service inside accepts
//! TCP connections. Teardown kills and removes it again.
//!
//! ## Architecture
//!
//! - [`client`]: the [`DaemonClient`] port and its bollard implementation
//! - [`config`]: container descriptors and port-binding tables
//! - [`ports`]: internal → external port resolution
//! - [`image`]: image tag matching
//! - [`executor`]: command execution inside a running container
//! - [`probe`]: TCP readiness probe
//! - [`lifecycle`]: the provision/destroy state machine
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fixture_env::config::FixtureConfig;
//! use fixture_env::container::{
//!     ContainerDescriptor, ContainerLifecycleManager, DockerDaemon, PortAllocator, PortMapping,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FixtureConfig::from_env()?;
//!     let daemon = DockerDaemon::connect(&config.daemon).await?;
//!
//!     let allocator = PortAllocator::new(config.port_overrides.clone());
//!     let ports = PortMapping::resolve(&[1521], &allocator)?;
//!     let descriptor = ContainerDescriptor::new("test-db", "alexeiled/docker-oracle-xe-11g", ports);
//!
//!     let mut manager =
//!         ContainerLifecycleManager::new(Arc::new(daemon), descriptor, &config.daemon.probe_host);
//!     manager.provision().await?;
//!
//!     // ... run tests ...
//!
//!     manager.destroy().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod executor;
mod image;
mod lifecycle;
mod ports;
mod probe;

pub use client::{ContainerSummary, DaemonClient, DockerDaemon, ImageSummary, PublishedPort};
pub use config::{ContainerDescriptor, ContainerSpec};
pub use executor::{ExecConfig, ExecConfigBuilder, ExecOutput};
pub use image::{find_image, normalize_image_reference};
pub use lifecycle::{ContainerHandle, ContainerLifecycleManager, LifecycleState};
pub use ports::{PortAllocator, PortMapping};
pub use probe::probe_tcp;

use std::time::Duration;

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A daemon operation on a named container failed and will not be retried.
    #[error("Unable to {operation} container '{container}': {source}")]
    Operation {
        operation: &'static str,
        container: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// The readiness probe never connected.
    #[error(
        "Container '{container}' has failed to start. Port {host}:{port} not available after {attempts} attempts in {elapsed:?}"
    )]
    NotReady {
        container: String,
        host: String,
        port: u16,
        attempts: u32,
        elapsed: Duration,
    },

    /// A command inside the container exited unsuccessfully.
    #[error("Command {command} in container '{container}' exited with {exit_code:?}: {output}")]
    ExecFailed {
        container: String,
        command: String,
        exit_code: Option<i64>,
        output: String,
    },

    /// Execution error
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// HTTP status of a daemon response error, if this is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code,
                ..
            }) => Some(*status_code),
            ContainerError::Operation { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// The daemon said the container does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    pub(crate) fn operation(
        operation: &'static str,
        container: impl Into<String>,
        source: ContainerError,
    ) -> Self {
        ContainerError::Operation {
            operation,
            container: container.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
pub(crate) mod testing;
