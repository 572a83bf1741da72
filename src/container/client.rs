//! Container daemon port and its Docker implementation.
//!
//! [`DaemonClient`] is the subset of the daemon API the lifecycle manager
//! needs. [`DockerDaemon`] implements it over bollard; tests substitute an
//! in-memory fake.

use crate::config::DaemonConfig;
use crate::container::{ContainerError, ContainerSpec, ExecConfig, ExecOutput, Result};
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, KillContainerOptions,
    ListContainersOptionsBuilder, ListImagesOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Image as listed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
}

/// Container as listed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as reported by the daemon, usually with a leading `/`.
    pub names: Vec<String>,
    /// Machine-readable state (`running`, `exited`, ...).
    pub state: String,
    /// Human-readable status (`Up 3 minutes`, `Exited (0) ...`).
    pub status: String,
    /// Ports the container exposes, with the host port when published.
    pub ports: Vec<PublishedPort>,
}

/// One exposed container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPort {
    pub internal: u16,
    pub external: Option<u16>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running") || self.status.starts_with("Up")
    }

    /// Substring match of `name` against every reported name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.contains(name))
    }

    /// Host port the daemon published `internal` on.
    pub fn published_port(&self, internal: u16) -> Option<u16> {
        self.ports
            .iter()
            .filter(|p| p.internal == internal)
            .find_map(|p| p.external)
    }
}

/// Operations the lifecycle manager performs against a container daemon.
pub trait DaemonClient: Send + Sync {
    /// Check that the daemon answers.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;

    /// Every image known to the daemon.
    fn list_images(&self) -> BoxFuture<'_, Result<Vec<ImageSummary>>>;

    /// Pull `image`, blocking until the pull completes.
    fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Containers, including stopped ones when `all` is set.
    fn list_containers(&self, all: bool) -> BoxFuture<'_, Result<Vec<ContainerSummary>>>;

    /// Create a container under `name`, returning the daemon id.
    fn create_container<'a>(
        &'a self,
        name: &'a str,
        spec: &'a ContainerSpec,
    ) -> BoxFuture<'a, Result<String>>;

    fn start_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;

    fn kill_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;

    fn remove_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Run a command in a running container and wait for it to finish.
    fn exec<'a>(&'a self, id: &'a str, config: &'a ExecConfig) -> BoxFuture<'a, Result<ExecOutput>>;
}

/// Docker daemon client backed by bollard.
#[derive(Clone)]
pub struct DockerDaemon {
    docker: Arc<Docker>,
}

impl DockerDaemon {
    /// Connect to the daemon described by `config` and ping it.
    ///
    /// `unix://` hosts use the socket, `tcp://` and `http://` hosts use plain
    /// HTTP. TLS connections are not supported.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] for an unusable host URL or a
    /// TLS-enabled configuration, or the daemon error if the ping fails.
    pub async fn connect(config: &DaemonConfig) -> Result<Self> {
        let docker = Self::connect_docker(config)?;
        let daemon = Self::from_docker(docker);

        debug!("Connecting to Docker at {}", config.host);
        daemon.ping().await.map_err(|e| {
            ContainerError::Other(format!("Unable to connect to Docker at {}: {}", config.host, e))
        })?;
        info!("Connection to Docker established at {}", config.host);

        Ok(daemon)
    }

    /// Wrap an existing bollard client.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker: Arc::new(docker),
        }
    }

    fn connect_docker(config: &DaemonConfig) -> Result<Docker> {
        if config.tls_verify {
            return Err(ContainerError::ConfigError(format!(
                "TLS daemon connections are not supported (DOCKER_TLS_VERIFY is set for {})",
                config.host
            )));
        }

        let url = Url::parse(&config.host).map_err(|e| {
            ContainerError::ConfigError(format!("Invalid DOCKER_HOST '{}': {}", config.host, e))
        })?;

        match url.scheme() {
            "unix" => Ok(Docker::connect_with_socket(
                &config.host,
                config.timeout_secs,
                API_DEFAULT_VERSION,
            )?),
            "tcp" | "http" => {
                let host = url.host_str().ok_or_else(|| {
                    ContainerError::ConfigError(format!("DOCKER_HOST '{}' has no host", config.host))
                })?;
                let address = match url.port() {
                    Some(port) => format!("http://{}:{}", host, port),
                    None => format!("http://{}", host),
                };
                Ok(Docker::connect_with_http(
                    &address,
                    config.timeout_secs,
                    API_DEFAULT_VERSION,
                )?)
            }
            other => Err(ContainerError::ConfigError(format!(
                "Unsupported DOCKER_HOST scheme '{}' in '{}'",
                other, config.host
            ))),
        }
    }
}

impl DaemonClient for DockerDaemon {
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.docker.ping().await?;
            debug!("Container runtime ping successful");
            Ok(())
        })
    }

    fn list_images(&self) -> BoxFuture<'_, Result<Vec<ImageSummary>>> {
        Box::pin(async move {
            let images = self
                .docker
                .list_images(Some(ListImagesOptionsBuilder::new().all(true).build()))
                .await?;

            Ok(images
                .into_iter()
                .map(|img| ImageSummary {
                    id: img.id,
                    repo_tags: img.repo_tags,
                })
                .collect())
        })
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!("Pulling image: {}", image);

            let mut stream = self.docker.create_image(
                Some(CreateImageOptionsBuilder::new().from_image(image).build()),
                None,
                None,
            );

            while let Some(result) = stream.next().await {
                let info = result?;
                if let Some(status) = info.status {
                    debug!("Pull: {}", status);
                }
                if let Some(error) = info.error {
                    return Err(ContainerError::Other(format!("Pull failed: {}", error)));
                }
            }

            info!("Successfully pulled image: {}", image);
            Ok(())
        })
    }

    fn list_containers(&self, all: bool) -> BoxFuture<'_, Result<Vec<ContainerSummary>>> {
        Box::pin(async move {
            let containers = self
                .docker
                .list_containers(Some(ListContainersOptionsBuilder::new().all(all).build()))
                .await?;

            Ok(containers
                .into_iter()
                .map(|c| ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    names: c.names.unwrap_or_default(),
                    state: c.state.map(|s| s.to_string()).unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                    ports: c
                        .ports
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| PublishedPort {
                            internal: p.private_port,
                            external: p.public_port,
                        })
                        .collect(),
                })
                .collect())
        })
    }

    fn create_container<'a>(
        &'a self,
        name: &'a str,
        spec: &'a ContainerSpec,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let options = CreateContainerOptionsBuilder::new().name(name).build();

            let body = ContainerCreateBody {
                image: Some(spec.image.clone()),
                exposed_ports: spec.exposed_ports.clone(),
                host_config: Some(spec.host_config.clone()),
                ..Default::default()
            };

            let response = self.docker.create_container(Some(options), body).await?;

            debug!("Created container: {} ({})", name, response.id);
            Ok(response.id)
        })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.docker
                .start_container(id, None::<StartContainerOptions>)
                .await?;
            Ok(())
        })
    }

    fn kill_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.docker
                .kill_container(id, None::<KillContainerOptions>)
                .await?;
            Ok(())
        })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.docker
                .remove_container(id, Some(RemoveContainerOptionsBuilder::new().v(true).build()))
                .await?;
            Ok(())
        })
    }

    fn exec<'a>(&'a self, id: &'a str, config: &'a ExecConfig) -> BoxFuture<'a, Result<ExecOutput>> {
        Box::pin(super::executor::execute(&self.docker, id, config))
    }
}
