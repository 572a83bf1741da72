//! Oracle engine: session reaping and idempotent teardown.
//!
//! Teardown of a principal has to wait until none of its sessions remain,
//! because `DROP USER ... CASCADE` fails (or worse, races concurrent work)
//! while a session is attached. [`SessionReaper`] kills and confirms;
//! [`TeardownOrchestrator`] sequences the drops:
//!
//! ```text
//! for each user:       reap sessions ─▶ DROP USER ... CASCADE      (ORA-01918 ok)
//! for each user:       DROP PUBLIC SYNONYM for its tables          (ORA-01432 ok)
//! for each tablespace: DROP TABLESPACE ... INCLUDING CONTENTS      (ORA-00959 ok)
//! DELETE FROM DATABASECHANGELOG WHERE ID LIKE 'prefix%'            (ORA-00942 ok)
//! ```
//!
//! Each step tolerates only the "does not exist" code for its own object
//! kind. Any other error aborts the teardown.

#[cfg(feature = "oracle")]
mod connection;
mod engine;
mod reaper;
pub mod sql;
mod teardown;

#[cfg(feature = "oracle")]
pub use connection::OracleConnector;
pub use engine::OracleEngine;
pub use reaper::{DatabaseSession, SessionReaper};
pub use teardown::{TeardownOrchestrator, TeardownTarget};

use crate::env::oracle as defaults;
use serde::{Deserialize, Serialize};

pub const ENGINE_NAME: &str = "oracle";

fn default_port() -> u16 {
    defaults::PORT
}

fn default_service() -> String {
    defaults::SERVICE.to_string()
}

/// Connection and teardown settings for an Oracle database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleProperties {
    /// Administrative account used for teardown.
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Listener port inside the container.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Service or pluggable database name.
    #[serde(default = "default_service")]
    pub service: String,
    /// Principals created by the fixture and dropped on teardown.
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub tablespaces: Vec<String>,
}

impl OracleProperties {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            port: default_port(),
            service: default_service(),
            users: Vec::new(),
            tablespaces: Vec::new(),
        }
    }

    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tablespaces<I, S>(mut self, tablespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tablespaces = tablespaces.into_iter().map(Into::into).collect();
        self
    }

    /// JDBC-style URL, as migration tools expect it.
    pub fn url(&self, hostname: &str, port: u16) -> String {
        format!("jdbc:oracle:thin:@{}:{}/{}", hostname, port, self.service)
    }

    /// Easy Connect string for the native client.
    pub fn connect_string(&self, hostname: &str, port: u16) -> String {
        format!("//{}:{}/{}", hostname, port, self.service)
    }
}
