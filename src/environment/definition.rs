//! Environment definitions loaded from TOML.
//!
//! ```toml
//! [container]
//! name = "oracle-xe"
//! image = "alexeiled/docker-oracle-xe-11g"
//! ports = [1521]
//! settle_delay_secs = 10
//!
//! [[container.init]]
//! description = "Create cluster"
//! cmd = ["/opt/couchbase/bin/couchbase-cli", "setting-cluster", "..."]
//!
//! [database]
//! engine = "oracle"
//! username = "system"
//! password = "oracle"
//! users = ["TEST_USER1"]
//! change_log_prefix = "test-"
//! change_log_file = "db/changelog.xml"
//! ```

use crate::container::{ContainerDescriptor, ExecConfig, PortAllocator, PortMapping};
use crate::database::DatabaseConfig;
use crate::database::oracle::OracleProperties;
use crate::env::{couchbase, oracle};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A command run inside the container once it is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCommand {
    pub description: String,
    #[serde(flatten)]
    pub exec: ExecConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    /// Internal ports; the first one is the readiness probe.
    pub ports: Vec<u16>,
    /// Pause after readiness before anything talks to the service.
    #[serde(default)]
    pub settle_delay_secs: u64,
    #[serde(default)]
    pub init: Vec<InitCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDefinition {
    /// Change-log ids starting with this are removed on teardown.
    pub change_log_prefix: String,
    #[serde(default)]
    pub change_log_file: Option<PathBuf>,
    #[serde(flatten)]
    pub config: DatabaseConfig,
}

/// One container, optionally hosting a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDefinition {
    pub container: ContainerDefinition,
    #[serde(default)]
    pub database: Option<DatabaseDefinition>,
}

impl EnvironmentDefinition {
    /// Load and validate a TOML definition.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read environment definition {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid environment definition {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let definition: Self = toml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check the definition is usable before anything touches the daemon.
    pub fn validate(&self) -> Result<()> {
        let container = &self.container;
        if container.name.trim().is_empty() {
            bail!("container name must not be empty");
        }
        if container.image.trim().is_empty() {
            bail!("container '{}' has no image", container.name);
        }

        let mut seen = HashSet::new();
        for port in &container.ports {
            if *port == 0 {
                bail!("container '{}' declares port 0", container.name);
            }
            if !seen.insert(*port) {
                bail!("container '{}' declares port {} twice", container.name, port);
            }
        }

        for init in &container.init {
            if init.exec.cmd.is_empty() {
                bail!("init command '{}' has no cmd", init.description);
            }
        }

        if let Some(database) = &self.database {
            let port = database.config.port();
            if !seen.contains(&port) {
                bail!(
                    "{} port {} is not published by container '{}'",
                    database.config.engine_name(),
                    port,
                    container.name
                );
            }
        }
        Ok(())
    }

    /// Resolve external ports and build the container descriptor.
    pub fn descriptor(&self, allocator: &PortAllocator) -> Result<ContainerDescriptor> {
        let ports = PortMapping::resolve(&self.container.ports, allocator)
            .with_context(|| format!("Unable to resolve ports for '{}'", self.container.name))?;
        Ok(ContainerDescriptor::new(
            &self.container.name,
            &self.container.image,
            ports,
        ))
    }

    /// Oracle XE 11g on 1521.
    pub fn oracle_xe(properties: OracleProperties, change_log_prefix: impl Into<String>) -> Self {
        Self {
            container: ContainerDefinition {
                name: oracle::CONTAINER_NAME.to_string(),
                image: oracle::IMAGE.to_string(),
                ports: vec![properties.port],
                settle_delay_secs: oracle::SETTLE_DELAY_SECS,
                init: Vec::new(),
            },
            database: Some(DatabaseDefinition {
                change_log_prefix: change_log_prefix.into(),
                change_log_file: None,
                config: DatabaseConfig::Oracle(properties),
            }),
        }
    }

    /// Single-node Couchbase cluster with data, index, query, and search.
    pub fn couchbase() -> Self {
        let cli = |args: &[&str]| {
            let mut cmd = vec![
                couchbase::CLI.to_string(),
                args[0].to_string(),
                "-c".to_string(),
                "127.0.0.1:8091".to_string(),
                "-u".to_string(),
                couchbase::ADMIN_USER.to_string(),
                "-p".to_string(),
                couchbase::ADMIN_PASSWORD.to_string(),
            ];
            cmd.extend(args[1..].iter().map(|a| a.to_string()));
            ExecConfig::builder().cmd(cmd).build()
        };
        let ramsize = format!("--cluster-ramsize={}", couchbase::CLUSTER_RAMSIZE_MB);
        let index_ramsize = format!("--cluster-index-ramsize={}", couchbase::CLUSTER_RAMSIZE_MB);

        Self {
            container: ContainerDefinition {
                name: couchbase::CONTAINER_NAME.to_string(),
                image: couchbase::IMAGE.to_string(),
                ports: couchbase::PORTS.to_vec(),
                settle_delay_secs: 0,
                init: vec![
                    InitCommand {
                        description: "Create Couchbase cluster".to_string(),
                        exec: cli(&[
                            "setting-cluster",
                            "--cluster-name",
                            couchbase::CLUSTER_NAME,
                            ramsize.as_str(),
                        ]),
                    },
                    InitCommand {
                        description: "Initialise Couchbase cluster".to_string(),
                        exec: cli(&[
                            "cluster-init",
                            "--services=data,index,query,fts",
                            "--index-storage-setting=default",
                            ramsize.as_str(),
                            index_ramsize.as_str(),
                        ]),
                    },
                ],
            },
            database: None,
        }
    }
}
