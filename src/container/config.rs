//! Container descriptors and creation specs.
//!
//! A [`ContainerDescriptor`] is the logical identity of a fixture container:
//! its name (not the daemon id, so a container left behind by a crashed run
//! can be found again), its image, and its port mapping. A [`ContainerSpec`]
//! is what actually gets sent to the daemon on creation.

use crate::container::{ContainerError, PortMapping, PublishedPort, Result};
use bollard::service::{HostConfig, PortBinding};
use serde::Serialize;
use std::collections::HashMap;

/// Address published ports bind to on the daemon host.
pub const BIND_ALL_INTERFACES: &str = "0.0.0.0";

/// Logical identity of one fixture container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerDescriptor {
    pub name: String,
    pub image: String,
    pub port_mapping: PortMapping,
}

impl ContainerDescriptor {
    pub fn new(name: impl Into<String>, image: impl Into<String>, port_mapping: PortMapping) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            port_mapping,
        }
    }

    /// Daemon-side creation spec: every internal port bound to
    /// `0.0.0.0:<external>` over TCP.
    ///
    /// # Errors
    ///
    /// Returns error if the descriptor has no image.
    pub fn to_spec(&self) -> Result<ContainerSpec> {
        self.port_mapping
            .iter()
            .fold(ContainerSpec::builder().image(&self.image), |builder, (internal, external)| {
                builder.port_binding(format!("{}/tcp", internal), external)
            })
            .build()
    }
}

/// Builder for [`ContainerSpec`].
#[derive(Debug, Default)]
pub struct ContainerSpecBuilder {
    image: Option<String>,
    port_bindings: HashMap<String, Option<Vec<PortBinding>>>,
}

impl ContainerSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container image.
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Publish `container_port` (e.g. `1521/tcp`) on `host_port` of every interface.
    pub fn port_binding<S: Into<String>>(mut self, container_port: S, host_port: u16) -> Self {
        self.port_bindings.insert(
            container_port.into(),
            Some(vec![PortBinding {
                host_ip: Some(BIND_ALL_INTERFACES.to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );
        self
    }

    /// # Errors
    ///
    /// Returns error if no image was set.
    pub fn build(self) -> Result<ContainerSpec> {
        let image = self
            .image
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| ContainerError::ConfigError("Image is required".to_string()))?;

        let exposed_ports = if self.port_bindings.is_empty() {
            None
        } else {
            Some(
                self.port_bindings
                    .keys()
                    .map(|port| (port.clone(), HashMap::new()))
                    .collect(),
            )
        };

        let host_config = HostConfig {
            port_bindings: if self.port_bindings.is_empty() {
                None
            } else {
                Some(self.port_bindings)
            },
            ..Default::default()
        };

        Ok(ContainerSpec {
            image,
            exposed_ports,
            host_config,
        })
    }
}

/// Everything the daemon needs to create a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub exposed_ports: Option<HashMap<String, HashMap<(), ()>>>,
    pub host_config: HostConfig,
}

impl ContainerSpec {
    pub fn builder() -> ContainerSpecBuilder {
        ContainerSpecBuilder::new()
    }

    /// Host port bound to `container_port`, if any.
    pub fn host_port(&self, container_port: &str) -> Option<&str> {
        self.host_config
            .port_bindings
            .as_ref()?
            .get(container_port)?
            .as_ref()?
            .first()?
            .host_port
            .as_deref()
    }

    /// Ports as the daemon lists them once a container from this spec runs.
    pub fn published_ports(&self) -> Vec<PublishedPort> {
        let Some(bindings) = self.host_config.port_bindings.as_ref() else {
            return Vec::new();
        };
        bindings
            .iter()
            .filter_map(|(container_port, binding)| {
                let internal = container_port.split('/').next()?.parse().ok()?;
                let external = binding
                    .as_ref()
                    .and_then(|b| b.first())
                    .and_then(|b| b.host_port.as_deref())
                    .and_then(|p| p.parse().ok());
                Some(PublishedPort { internal, external })
            })
            .collect()
    }
}
