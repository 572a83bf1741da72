//! Database-level reconciliation for fixture environments.
//!
//! The teardown logic never talks to a driver directly. It goes through the
//! [`SqlExecutor`] port, which a [`Connector`] produces for a
//! [`ConnectTarget`]. Engine-specific behaviour sits behind the
//! [`DatabaseEngine`] capability trait, and the concrete engine is picked
//! from the [`DatabaseConfig`] variant by [`engine_for`].
//!
//! With the `oracle` cargo feature enabled, [`oracle::OracleConnector`]
//! provides a real connection through the Oracle client libraries.

pub mod oracle;

use crate::retry::BoundedRetry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error reported by the SQL port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlError {
    /// Vendor error code, when the driver reports one.
    pub code: Option<i32>,
    pub message: String,
}

impl SqlError {
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SqlError {}

/// One result row, every column rendered as text. NULL becomes an empty string.
pub type Row = Vec<String>;

/// Minimal SQL execution capability.
///
/// Parameters are positional string binds (`:1`, `:2`, ...).
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn query(&self, sql: &str, params: &[&str]) -> std::result::Result<Vec<Row>, SqlError>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[&str]) -> std::result::Result<u64, SqlError>;
}

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub connect_string: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("connect_string", &self.connect_string)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Opens connections for an engine.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> std::result::Result<Box<dyn SqlExecutor>, SqlError>;
}

/// Database errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Unusable database configuration
    #[error("Database configuration error: {0}")]
    Config(String),

    #[error("{engine} database not connected, call create_connection first")]
    NotConnected { engine: &'static str },

    /// A statement failed and the failure is not an "already absent" outcome.
    #[error("Unable to {operation}: {source}")]
    Sql {
        operation: String,
        #[source]
        source: SqlError,
    },

    /// Killed sessions were still listed when the confirmation budget ran out.
    #[error(
        "{remaining} session(s) for '{principal}' still alive after {attempts} checks in {elapsed:?}"
    )]
    SessionsSurvived {
        principal: String,
        remaining: usize,
        attempts: u32,
        elapsed: Duration,
    },
}

impl DatabaseError {
    pub(crate) fn sql(operation: impl Into<String>, source: SqlError) -> Self {
        DatabaseError::Sql {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// What a teardown pass actually removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownSummary {
    pub sessions_killed: usize,
    pub users_dropped: Vec<String>,
    pub synonyms_dropped: Vec<String>,
    pub tablespaces_dropped: Vec<String>,
    pub change_log_rows_deleted: u64,
}

/// Engine configuration, discriminated by the `engine` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Oracle(oracle::OracleProperties),
}

impl DatabaseConfig {
    pub fn engine_name(&self) -> &'static str {
        match self {
            DatabaseConfig::Oracle(_) => oracle::ENGINE_NAME,
        }
    }

    /// Service port inside the container.
    pub fn port(&self) -> u16 {
        match self {
            DatabaseConfig::Oracle(properties) => properties.port,
        }
    }
}

/// Capabilities every database engine provides.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Display URL of the database at `hostname:port`.
    fn url(&self, hostname: &str, port: u16) -> String;

    /// Connect to the database at `hostname:port`. No-op when already connected.
    async fn create_connection(&mut self, hostname: &str, port: u16) -> Result<()>;

    /// The open connection.
    fn executor(&self) -> Result<&dyn SqlExecutor>;

    /// Remove everything the fixture created. Safe to call on a database
    /// where none of it exists.
    async fn teardown(&self) -> Result<TeardownSummary>;

    /// Release the connection.
    async fn clean_up(&mut self);
}

/// Build the engine for `config`.
pub fn engine_for(
    config: &DatabaseConfig,
    change_log_prefix: &str,
    connector: Arc<dyn Connector>,
    retry: BoundedRetry,
) -> Box<dyn DatabaseEngine> {
    match config {
        DatabaseConfig::Oracle(properties) => Box::new(
            oracle::OracleEngine::new(properties.clone(), change_log_prefix, connector)
                .with_retry(retry),
        ),
    }
}

/// Connector for the drivers compiled into this build.
pub fn default_connector(config: &DatabaseConfig) -> Result<Arc<dyn Connector>> {
    match config {
        #[cfg(feature = "oracle")]
        DatabaseConfig::Oracle(_) => Ok(Arc::new(oracle::OracleConnector)),
        #[cfg(not(feature = "oracle"))]
        DatabaseConfig::Oracle(_) => Err(DatabaseError::Config(
            "built without the `oracle` feature, no Oracle driver available \
             (rebuild with `--features oracle`, or run `fixture-env down --skip-database` \
             to remove the container only)"
                .to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod testing;
