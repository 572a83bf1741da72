use super::{ENGINE_NAME, OracleProperties, TeardownOrchestrator, TeardownTarget};
use crate::database::{
    ConnectTarget, Connector, DatabaseEngine, DatabaseError, Result, SqlExecutor, TeardownSummary,
};
use crate::retry::{Attempt, BoundedRetry, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// [`DatabaseEngine`] for Oracle.
pub struct OracleEngine {
    properties: OracleProperties,
    change_log_prefix: String,
    connector: Arc<dyn Connector>,
    retry: BoundedRetry,
    connection: Option<Box<dyn SqlExecutor>>,
}

impl OracleEngine {
    pub fn new(
        properties: OracleProperties,
        change_log_prefix: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            properties,
            change_log_prefix: change_log_prefix.into(),
            connector,
            retry: BoundedRetry::with_policy(RetryPolicy::readiness()),
            connection: None,
        }
    }

    /// Clock source for connection and session-death retries. Connecting
    /// uses the readiness budget, session death the shorter one.
    pub fn with_retry(mut self, retry: BoundedRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn properties(&self) -> &OracleProperties {
        &self.properties
    }

    pub fn teardown_target(&self) -> TeardownTarget {
        TeardownTarget {
            principals: self.properties.users.clone(),
            tablespaces: self.properties.tablespaces.clone(),
            change_log_prefix: self.change_log_prefix.clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[async_trait]
impl DatabaseEngine for OracleEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn url(&self, hostname: &str, port: u16) -> String {
        self.properties.url(hostname, port)
    }

    async fn create_connection(&mut self, hostname: &str, port: u16) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let target = ConnectTarget {
            connect_string: self.properties.connect_string(hostname, port),
            username: self.properties.username.clone(),
            password: self.properties.password.clone(),
        };
        let url = self.url(hostname, port);
        debug!("Connecting to {} as {}", url, target.username);

        let connector = &self.connector;
        let target = &target;
        let connection = self
            .retry
            .with_other_policy(RetryPolicy::readiness())
            .execute(|| async move { connector.connect(target).await.map_err(Attempt::Transient) })
            .await
            .map_err(|e| DatabaseError::sql(format!("connect to {}", url), e.into_inner()))?;

        info!("Connected to {}", url);
        self.connection = Some(connection);
        Ok(())
    }

    fn executor(&self) -> Result<&dyn SqlExecutor> {
        self.connection
            .as_deref()
            .ok_or(DatabaseError::NotConnected {
                engine: ENGINE_NAME,
            })
    }

    async fn teardown(&self) -> Result<TeardownSummary> {
        let db = self.executor()?;
        let retry = self.retry.with_other_policy(RetryPolicy::session_death());
        TeardownOrchestrator::with_retry(db, retry)
            .teardown(&self.teardown_target())
            .await
    }

    async fn clean_up(&mut self) {
        if self.connection.take().is_some() {
            debug!("Closed {} connection", ENGINE_NAME);
        }
    }
}
