//! Native Oracle connection through the `oracle` crate (ODPI-C).
//!
//! The driver is blocking, so every call runs on tokio's blocking pool.
//! Statements are committed right away; teardown never needs a transaction
//! spanning several statements.

use crate::database::{ConnectTarget, Connector, Row, SqlError, SqlExecutor};
use async_trait::async_trait;
use oracle::sql_type::ToSql;
use oracle::{Connection, Error as OracleError};
use std::sync::Arc;
use tokio::task;

fn to_sql_error(err: OracleError) -> SqlError {
    let code = err.db_error().map(|db| db.code());
    SqlError::new(code, err.to_string())
}

fn join_error(err: task::JoinError) -> SqlError {
    SqlError::new(None, format!("database task failed: {}", err))
}

/// [`Connector`] opening native Oracle connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleConnector;

#[async_trait]
impl Connector for OracleConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn SqlExecutor>, SqlError> {
        let target = target.clone();
        let connection = task::spawn_blocking(move || {
            Connection::connect(&target.username, &target.password, &target.connect_string)
        })
        .await
        .map_err(join_error)?
        .map_err(to_sql_error)?;

        Ok(Box::new(OracleConnection {
            connection: Arc::new(connection),
        }))
    }
}

struct OracleConnection {
    connection: Arc<Connection>,
}

impl OracleConnection {
    async fn blocking<T, F>(&self, f: F) -> Result<T, SqlError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, OracleError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        task::spawn_blocking(move || f(&connection))
            .await
            .map_err(join_error)?
            .map_err(to_sql_error)
    }
}

fn owned(params: &[&str]) -> Vec<String> {
    params.iter().map(|p| p.to_string()).collect()
}

#[async_trait]
impl SqlExecutor for OracleConnection {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, SqlError> {
        let sql = sql.to_string();
        let params = owned(params);
        self.blocking(move |conn| {
            let binds: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
            let rows = conn.query(&sql, &binds)?;
            let mut result = Vec::new();
            for row in rows {
                let row = row?;
                let columns = row.sql_values().len();
                let mut values = Vec::with_capacity(columns);
                for index in 0..columns {
                    values.push(row.get::<usize, Option<String>>(index)?.unwrap_or_default());
                }
                result.push(values);
            }
            Ok(result)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[&str]) -> Result<u64, SqlError> {
        let sql = sql.to_string();
        let params = owned(params);
        self.blocking(move |conn| {
            let binds: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
            let statement = conn.execute(&sql, &binds)?;
            let count = statement.row_count()?;
            conn.commit()?;
            Ok(count)
        })
        .await
    }
}
