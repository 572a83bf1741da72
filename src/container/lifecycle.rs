//! Provision/destroy state machine for one fixture container.
//!
//! ```text
//! Unverified ──image present/pulled──▶ ImageReady ──list by name──┬─▶ Reusable ──kill+remove──┐
//!                                                                 └─▶ AbsentNeedsCreate ──────┤
//!                                                                                             ▼
//!                          Ready ◀──port accepts TCP── Starting ◀──daemon start── Created ◀──┘
//!
//! any state except Unverified ──destroy()──▶ Removed
//! ```
//!
//! A container found under the logical name is never adopted: there is no way
//! to check it matches the current descriptor, so it is killed and removed
//! and a fresh one is created.

use super::{
    ContainerDescriptor, ContainerError, ContainerSummary, DaemonClient, ExecConfig, ExecOutput,
    Result, find_image, probe_tcp,
};
use crate::retry::{Attempt, BoundedRetry, RetryError, RetryPolicy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where the manager is in the provisioning sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Unverified,
    ImageReady,
    /// A container with the logical name exists and is about to be replaced.
    Reusable,
    AbsentNeedsCreate,
    Created,
    Starting,
    Ready,
    Removed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A created container. Only the lifecycle manager hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHandle {
    pub daemon_id: String,
    pub descriptor: ContainerDescriptor,
    pub created_at: DateTime<Utc>,
}

impl ContainerHandle {
    /// Shortened daemon id for log lines.
    pub fn short_id(&self) -> &str {
        self.daemon_id.get(..12).unwrap_or(&self.daemon_id)
    }
}

/// Owns one container's lifecycle against a container daemon.
pub struct ContainerLifecycleManager {
    daemon: Arc<dyn DaemonClient>,
    descriptor: ContainerDescriptor,
    probe_host: String,
    retry: BoundedRetry,
    state: LifecycleState,
    handle: Option<ContainerHandle>,
}

impl fmt::Debug for ContainerLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerLifecycleManager")
            .field("descriptor", &self.descriptor)
            .field("probe_host", &self.probe_host)
            .field("state", &self.state)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl ContainerLifecycleManager {
    /// Manager using the default 30s/1s budget for start and readiness.
    pub fn new(
        daemon: Arc<dyn DaemonClient>,
        descriptor: ContainerDescriptor,
        probe_host: impl Into<String>,
    ) -> Self {
        Self {
            daemon,
            descriptor,
            probe_host: probe_host.into(),
            retry: BoundedRetry::with_policy(RetryPolicy::readiness()),
            state: LifecycleState::Unverified,
            handle: None,
        }
    }

    /// Replace the retry executor used for start, readiness, and exec.
    pub fn with_retry(mut self, retry: BoundedRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn handle(&self) -> Option<&ContainerHandle> {
        self.handle.as_ref()
    }

    pub fn descriptor(&self) -> &ContainerDescriptor {
        &self.descriptor
    }

    pub fn probe_host(&self) -> &str {
        &self.probe_host
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Bring a fresh container up and wait until it accepts connections.
    ///
    /// # Errors
    ///
    /// Daemon failures while listing, pulling, creating, or starting are
    /// returned as [`ContainerError::Operation`] naming the step and the
    /// container. A readiness probe that never connects is returned as
    /// [`ContainerError::NotReady`].
    pub async fn provision(&mut self) -> Result<&ContainerHandle> {
        info!("Setting up Docker container '{}'", self.name());

        self.ensure_image().await?;

        match self.find_existing().await? {
            Some(existing) => {
                self.state = LifecycleState::Reusable;
                warn!(
                    "Container '{}' already exists ({}), replacing it",
                    self.name(),
                    existing.status
                );
                self.kill_and_remove(&existing).await?;
            }
            None => self.state = LifecycleState::AbsentNeedsCreate,
        }

        let daemon_id = self.create().await?;
        self.start(&daemon_id).await?;
        self.wait_until_ready().await?;

        match self.handle.as_ref() {
            Some(handle) => {
                info!(
                    "Docker container '{}' ready ({})",
                    handle.descriptor.name,
                    handle.short_id()
                );
                Ok(handle)
            }
            None => Err(ContainerError::Other(format!(
                "Container '{}' lost its handle during provisioning",
                self.descriptor.name
            ))),
        }
    }

    /// Kill and remove the container if one exists under the logical name.
    ///
    /// Calling this when nothing exists is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if listing, killing, or removing fails for a reason
    /// other than the container already being gone.
    pub async fn destroy(&mut self) -> Result<()> {
        match self.find_existing().await? {
            Some(existing) => {
                self.kill_and_remove(&existing).await?;
                info!("Docker container '{}' killed and removed", self.name());
            }
            None => {
                warn!("Container '{}' was not running", self.name());
            }
        }

        self.handle = None;
        self.state = LifecycleState::Removed;
        Ok(())
    }

    /// First container (running or stopped) whose name contains the logical name.
    ///
    /// Substring matching tolerates daemon-side name decorations such as the
    /// leading `/`, but it also matches unrelated containers that share the
    /// fragment (`db` matches `/test-db-2`). Pick logical names accordingly.
    ///
    /// # Errors
    ///
    /// Returns error if the daemon cannot list containers.
    pub async fn find_existing(&self) -> Result<Option<ContainerSummary>> {
        let containers = self
            .daemon
            .list_containers(true)
            .await
            .map_err(|e| ContainerError::operation("list", self.name(), e))?;

        Ok(containers
            .into_iter()
            .find(|container| container.matches_name(self.name())))
    }

    /// Run `config` in the provisioned container until it exits with 0.
    ///
    /// Non-zero exits and transient daemon errors are retried under the
    /// manager's budget; the container's service may still be initialising.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not provisioned, the daemon reports
    /// the container gone, or the command never succeeds within the budget.
    pub async fn exec_with_retry(&self, config: &ExecConfig) -> Result<ExecOutput> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            ContainerError::Other(format!(
                "Container '{}' is not provisioned (state {})",
                self.name(),
                self.state
            ))
        })?;

        let daemon = &self.daemon;
        let id = handle.daemon_id.as_str();
        let name = self.name();
        let command = config.display_command();
        let command = command.as_str();

        info!("Running '{}' in container '{}'", command, name);

        let result = self
            .retry
            .execute(|| async move {
                let output = daemon.exec(id, config).await.map_err(|e| {
                    if e.is_not_found() {
                        Attempt::Fatal(e)
                    } else {
                        Attempt::Transient(e)
                    }
                })?;

                if output.success() {
                    Ok(output)
                } else {
                    Err(Attempt::Transient(ContainerError::ExecFailed {
                        container: name.to_string(),
                        command: command.to_string(),
                        exit_code: output.exit_code,
                        output: output.combined(),
                    }))
                }
            })
            .await;

        match result {
            Ok(output) => {
                debug!("'{}' succeeded in container '{}'", command, name);
                Ok(output)
            }
            Err(e) => match e.into_inner() {
                failed @ ContainerError::ExecFailed { .. } => {
                    warn!("{}", failed);
                    Err(failed)
                }
                other => Err(ContainerError::operation("exec in", name, other)),
            },
        }
    }

    async fn ensure_image(&mut self) -> Result<()> {
        let image = self.descriptor.image.as_str();
        let images = self
            .daemon
            .list_images()
            .await
            .map_err(|e| ContainerError::operation("list images for", self.name(), e))?;

        if find_image(&images, image).is_some() {
            debug!("Image {} already exists locally", image);
        } else {
            self.daemon.pull_image(image).await.map_err(|e| {
                ContainerError::operation("pull image for", self.name(), e)
            })?;
        }

        self.state = LifecycleState::ImageReady;
        Ok(())
    }

    async fn kill_and_remove(&self, container: &ContainerSummary) -> Result<()> {
        if container.is_running() {
            debug!("Killing Docker container '{}'", self.name());
            match self.daemon.kill_container(&container.id).await {
                Ok(()) => {}
                // 404: already removed, 304/409: already stopped
                Err(e) if matches!(e.status_code(), Some(304) | Some(404) | Some(409)) => {
                    debug!("Container '{}' already stopped: {}", self.name(), e);
                }
                Err(e) => return Err(ContainerError::operation("kill", self.name(), e)),
            }
        }

        debug!("Removing Docker container '{}'", self.name());
        match self.daemon.remove_container(&container.id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Container '{}' already removed", self.name());
                Ok(())
            }
            Err(e) => Err(ContainerError::operation("remove", self.name(), e)),
        }
    }

    async fn create(&mut self) -> Result<String> {
        debug!("Creating Docker container '{}'", self.name());

        let spec = self.descriptor.to_spec()?;
        let daemon_id = self
            .daemon
            .create_container(&self.descriptor.name, &spec)
            .await
            .map_err(|e| ContainerError::operation("create", self.name(), e))?;

        debug!("Docker container '{}' created", self.name());

        self.handle = Some(ContainerHandle {
            daemon_id: daemon_id.clone(),
            descriptor: self.descriptor.clone(),
            created_at: Utc::now(),
        });
        self.state = LifecycleState::Created;
        Ok(daemon_id)
    }

    async fn start(&mut self, daemon_id: &str) -> Result<()> {
        info!("Starting container '{}'", self.name());

        let daemon = &self.daemon;
        let result = self
            .retry
            .execute(|| async move {
                daemon.start_container(daemon_id).await.map_err(|e| {
                    if e.is_not_found() {
                        Attempt::Fatal(e)
                    } else {
                        Attempt::Transient(e)
                    }
                })
            })
            .await;

        if let Err(e) = result {
            error!(
                "Unable to start container '{}'. Is there something running on the same ports?",
                self.name()
            );
            return Err(ContainerError::operation("start", self.name(), e.into_inner()));
        }

        debug!("Container '{}' started", self.name());
        self.state = LifecycleState::Starting;
        Ok(())
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let Some((internal, external)) = self.descriptor.port_mapping.first() else {
            debug!(
                "Container '{}' publishes no ports, skipping readiness probe",
                self.name()
            );
            self.state = LifecycleState::Ready;
            return Ok(());
        };

        debug!(
            "Waiting for container '{}' port {} on {}:{}",
            self.name(),
            internal,
            self.probe_host,
            external
        );

        let host = self.probe_host.as_str();
        let connect_timeout = self.retry.policy().interval();
        let result = self
            .retry
            .execute(|| async move {
                probe_tcp(host, external, connect_timeout)
                    .await
                    .map_err(Attempt::Transient)
            })
            .await;

        match result {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                Ok(())
            }
            Err(e) => {
                let (attempts, elapsed) = match &e {
                    RetryError::Exhausted {
                        attempts, elapsed, ..
                    } => (*attempts, *elapsed),
                    RetryError::Aborted(_) => (1, std::time::Duration::ZERO),
                };
                Err(ContainerError::NotReady {
                    container: self.descriptor.name.clone(),
                    host: self.probe_host.clone(),
                    port: external,
                    attempts,
                    elapsed,
                })
            }
        }
    }
}
