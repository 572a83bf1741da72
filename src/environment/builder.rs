use super::definition::EnvironmentDefinition;
use crate::container::{ContainerLifecycleManager, DaemonClient, PortAllocator};
use crate::database::{
    Connector, DatabaseConfig, DatabaseEngine, SqlExecutor, TeardownSummary, engine_for,
};
use crate::retry::{BoundedRetry, Clock, RetryPolicy, TokioClock};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Applies a change log to a freshly provisioned database.
///
/// Migration semantics live entirely on the other side of this trait.
#[async_trait]
pub trait ChangeLogRunner: Send + Sync {
    async fn update(&self, change_log_file: &Path, url: &str, db: &dyn SqlExecutor) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortReport {
    pub internal: u16,
    pub external: u16,
}

/// What `set_up` produced, for callers wiring tests against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub container_name: String,
    pub container_id: String,
    pub image: String,
    pub probe_host: String,
    pub ports: Vec<PortReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub change_log_applied: bool,
    pub provisioned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub container_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<TeardownSummary>,
    pub torn_down_at: DateTime<Utc>,
}

/// Drives one environment through set-up and tear-down.
///
/// Set-up: provision the container, wait the settle delay, run init
/// commands, apply the change log. Tear-down: database teardown while the
/// container still runs, then remove the container. The first error aborts.
pub struct EnvironmentBuilder {
    definition: EnvironmentDefinition,
    manager: ContainerLifecycleManager,
    clock: Arc<dyn Clock>,
    connector: Option<Arc<dyn Connector>>,
    change_log_runner: Option<Arc<dyn ChangeLogRunner>>,
}

impl EnvironmentBuilder {
    /// # Errors
    ///
    /// Returns error if the definition is invalid or its ports cannot be resolved.
    pub fn new(
        definition: EnvironmentDefinition,
        daemon: Arc<dyn DaemonClient>,
        allocator: &PortAllocator,
        probe_host: &str,
    ) -> Result<Self> {
        definition.validate()?;
        let descriptor = definition.descriptor(allocator)?;

        Ok(Self {
            manager: ContainerLifecycleManager::new(daemon, descriptor, probe_host),
            definition,
            clock: Arc::new(TokioClock),
            connector: None,
            change_log_runner: None,
        })
    }

    /// Clock for retries and the settle delay.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.manager = self
            .manager
            .with_retry(BoundedRetry::new(RetryPolicy::readiness(), clock.clone()));
        self.clock = clock;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_change_log_runner(mut self, runner: Arc<dyn ChangeLogRunner>) -> Self {
        self.change_log_runner = Some(runner);
        self
    }

    pub fn definition(&self) -> &EnvironmentDefinition {
        &self.definition
    }

    pub fn manager(&self) -> &ContainerLifecycleManager {
        &self.manager
    }

    /// Provision and initialise the environment.
    ///
    /// # Errors
    ///
    /// Returns the first failure from provisioning, an init command, or the
    /// change-log runner.
    pub async fn set_up(&mut self) -> Result<ProvisionReport> {
        let name = self.definition.container.name.clone();

        let container_id = self
            .manager
            .provision()
            .await
            .with_context(|| format!("Unable to set up environment '{}'", name))?
            .daemon_id
            .clone();

        let settle = self.definition.container.settle_delay_secs;
        if settle > 0 {
            info!("Waiting {}s for '{}' to settle", settle, name);
            self.clock.sleep(Duration::from_secs(settle)).await;
        }

        for init in &self.definition.container.init {
            info!("{}", init.description);
            self.manager
                .exec_with_retry(&init.exec)
                .await
                .with_context(|| format!("{} failed in '{}'", init.description, name))?;
        }

        let change_log_applied = self.apply_change_log().await?;

        let descriptor = self.manager.descriptor();
        Ok(ProvisionReport {
            container_name: name,
            container_id,
            image: descriptor.image.clone(),
            probe_host: self.manager.probe_host().to_string(),
            ports: descriptor
                .port_mapping
                .iter()
                .map(|(internal, external)| PortReport { internal, external })
                .collect(),
            database_url: self.database_url(),
            change_log_applied,
            provisioned_at: Utc::now(),
        })
    }

    /// Tear the database down, then remove the container.
    ///
    /// # Errors
    ///
    /// Returns error if database teardown fails (the container is left
    /// running) or the container cannot be removed.
    pub async fn tear_down(&mut self) -> Result<TeardownReport> {
        info!("Tearing down environment '{}'", self.definition.container.name);

        let database = if self.definition.database.is_some() {
            Some(self.tear_down_database(None).await?)
        } else {
            None
        };

        self.remove_container(database).await
    }

    /// Remove the container without touching the database.
    ///
    /// # Errors
    ///
    /// Returns error if the container cannot be removed.
    pub async fn tear_down_container(&mut self) -> Result<TeardownReport> {
        info!(
            "Removing container for '{}', database teardown skipped",
            self.definition.container.name
        );
        self.remove_container(None).await
    }

    async fn remove_container(
        &mut self,
        database: Option<TeardownSummary>,
    ) -> Result<TeardownReport> {
        let name = self.definition.container.name.clone();
        self.manager
            .destroy()
            .await
            .with_context(|| format!("Unable to remove container for '{}'", name))?;

        Ok(TeardownReport {
            container_name: name,
            database,
            torn_down_at: Utc::now(),
        })
    }

    /// Database-only teardown against `host` (the probe host by default).
    ///
    /// The port is the one the running container actually publishes, so an
    /// allocated external port from an earlier `set_up` is found again. The
    /// connection is released whether or not the teardown succeeds.
    ///
    /// # Errors
    ///
    /// Returns error if the environment has no database, no connector is
    /// configured, or the connection or teardown fails.
    pub async fn tear_down_database(&self, host: Option<&str>) -> Result<TeardownSummary> {
        let mut engine = self.engine()?;
        let host = host.unwrap_or(self.manager.probe_host()).to_string();
        let port = self.live_database_port().await?;

        info!("Tearing down {} database on {}:{}", engine.name(), host, port);

        let result: crate::database::Result<TeardownSummary> = async {
            engine.create_connection(&host, port).await?;
            engine.teardown().await
        }
        .await;
        engine.clean_up().await;

        result.context("Database teardown has failed")
    }

    async fn apply_change_log(&self) -> Result<bool> {
        let Some(database) = &self.definition.database else {
            return Ok(false);
        };
        let Some(change_log_file) = database.change_log_file.clone() else {
            return Ok(false);
        };
        let Some(runner) = self.change_log_runner.clone() else {
            warn!(
                "No change-log runner configured, skipping {}",
                change_log_file.display()
            );
            return Ok(false);
        };

        let mut engine = self.engine()?;
        let host = self.manager.probe_host().to_string();
        let port = self.database_port()?;
        let url = engine.url(&host, port);

        info!("Setting up database {} on {}", change_log_file.display(), url);

        let result: Result<()> = async {
            engine.create_connection(&host, port).await?;
            runner
                .update(&change_log_file, &url, engine.executor()?)
                .await
        }
        .await;
        engine.clean_up().await;

        result.context("Database setup has failed")?;
        Ok(true)
    }

    fn engine(&self) -> Result<Box<dyn DatabaseEngine>> {
        let database = self
            .definition
            .database
            .as_ref()
            .ok_or_else(|| anyhow!("Environment '{}' has no database", self.definition.container.name))?;
        let connector = self
            .connector
            .clone()
            .ok_or_else(|| anyhow!("No database connector configured"))?;

        Ok(engine_for(
            &database.config,
            &database.change_log_prefix,
            connector,
            BoundedRetry::new(RetryPolicy::readiness(), self.clock.clone()),
        ))
    }

    fn database_internal_port(&self) -> Result<u16> {
        self.definition
            .database
            .as_ref()
            .map(|database| database.config.port())
            .ok_or_else(|| anyhow!("Environment '{}' has no database", self.definition.container.name))
    }

    fn database_port(&self) -> Result<u16> {
        let internal = self.database_internal_port()?;
        self.manager
            .descriptor()
            .port_mapping
            .external_for(internal)
            .ok_or_else(|| anyhow!("Database port {} is not published", internal))
    }

    /// Published database port of the running container, falling back to the
    /// descriptor when the daemon reports none.
    async fn live_database_port(&self) -> Result<u16> {
        let internal = self.database_internal_port()?;
        let existing = self
            .manager
            .find_existing()
            .await
            .context("Unable to look up the running container")?;

        match existing.and_then(|container| container.published_port(internal)) {
            Some(port) => Ok(port),
            None => {
                debug!(
                    "No published port {} reported for '{}', using the configured mapping",
                    internal, self.definition.container.name
                );
                self.database_port()
            }
        }
    }

    fn database_url(&self) -> Option<String> {
        let database = self.definition.database.as_ref()?;
        let port = self.database_port().ok()?;
        match &database.config {
            DatabaseConfig::Oracle(properties) => {
                Some(properties.url(self.manager.probe_host(), port))
            }
        }
    }
}
