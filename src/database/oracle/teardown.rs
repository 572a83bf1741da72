use super::SessionReaper;
use super::sql::{self, Absent};
use crate::database::{DatabaseError, Result, SqlExecutor, TeardownSummary};
use crate::env::oracle::CHANGE_LOG_TABLE;
use crate::retry::{BoundedRetry, RetryPolicy};
use tracing::{debug, info};

/// Objects a fixture created and teardown removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownTarget {
    pub principals: Vec<String>,
    pub tablespaces: Vec<String>,
    /// Change-log rows whose id starts with this are deleted.
    pub change_log_prefix: String,
}

impl TeardownTarget {
    fn validate(&self) -> Result<()> {
        for principal in &self.principals {
            sql::validate_identifier("user", principal)?;
        }
        for tablespace in &self.tablespaces {
            sql::validate_identifier("tablespace", tablespace)?;
        }
        Ok(())
    }
}

/// Sequences session reaping and object drops for one [`TeardownTarget`].
pub struct TeardownOrchestrator<'a> {
    db: &'a dyn SqlExecutor,
    reaper: SessionReaper<'a>,
}

impl<'a> TeardownOrchestrator<'a> {
    pub fn new(db: &'a dyn SqlExecutor) -> Self {
        Self::with_retry(db, BoundedRetry::with_policy(RetryPolicy::session_death()))
    }

    /// `retry` bounds the wait for killed sessions to disappear.
    pub fn with_retry(db: &'a dyn SqlExecutor, retry: BoundedRetry) -> Self {
        Self {
            db,
            reaper: SessionReaper::with_retry(db, retry),
        }
    }

    /// Remove everything in `target`.
    ///
    /// Running it twice, or against a database where nothing was ever
    /// created, succeeds and drops nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid names before touching the
    /// database, [`DatabaseError::SessionsSurvived`] if a principal's
    /// sessions outlive the kill, and the SQL error for any failure other
    /// than the step's own "does not exist" code.
    pub async fn teardown(&self, target: &TeardownTarget) -> Result<TeardownSummary> {
        target.validate()?;

        let mut summary = TeardownSummary::default();

        for principal in &target.principals {
            summary.sessions_killed += self.reaper.reap(principal).await?;

            info!("Dropping database user '{}'", principal);
            if self
                .execute_tolerating(&sql::drop_user(principal), &[], Absent::User, || {
                    format!("drop user '{}'", principal)
                })
                .await?
                .is_some()
            {
                summary.users_dropped.push(principal.clone());
            }
        }

        // after every user is gone, so no synonym target is mid-drop
        for principal in &target.principals {
            summary
                .synonyms_dropped
                .extend(self.drop_public_synonyms(principal).await?);
        }

        for tablespace in &target.tablespaces {
            info!("Dropping database tablespace '{}'", tablespace);
            if self
                .execute_tolerating(
                    &sql::drop_tablespace(tablespace),
                    &[],
                    Absent::Tablespace,
                    || format!("drop tablespace '{}'", tablespace),
                )
                .await?
                .is_some()
            {
                summary.tablespaces_dropped.push(tablespace.clone());
            }
        }

        summary.change_log_rows_deleted = self.clean_up_change_log(&target.change_log_prefix).await?;

        info!(
            "Database teardown complete: {} user(s), {} synonym(s), {} tablespace(s) dropped",
            summary.users_dropped.len(),
            summary.synonyms_dropped.len(),
            summary.tablespaces_dropped.len()
        );
        Ok(summary)
    }

    async fn drop_public_synonyms(&self, principal: &str) -> Result<Vec<String>> {
        info!("Dropping public synonyms for user '{}'", principal);

        let rows = self
            .db
            .query(sql::LIST_PUBLIC_SYNONYMS, &[principal])
            .await
            .map_err(|e| {
                DatabaseError::sql(format!("list public synonyms for '{}'", principal), e)
            })?;

        let mut dropped = Vec::new();
        for synonym in rows.into_iter().filter_map(|row| row.into_iter().next()) {
            debug!("Dropping public synonym '{}'", synonym);
            if self
                .execute_tolerating(
                    &sql::drop_public_synonym(&synonym),
                    &[],
                    Absent::PublicSynonym,
                    || format!("drop public synonym '{}'", synonym),
                )
                .await?
                .is_some()
            {
                dropped.push(synonym);
            }
        }
        Ok(dropped)
    }

    async fn clean_up_change_log(&self, prefix: &str) -> Result<u64> {
        let pattern = sql::change_log_pattern(prefix);
        info!(
            "Cleaning up {} table for ID like '{}'",
            CHANGE_LOG_TABLE, pattern
        );

        Ok(self
            .execute_tolerating(sql::DELETE_CHANGE_LOG, &[pattern.as_str()], Absent::Table, || {
                format!("clean up {}", CHANGE_LOG_TABLE)
            })
            .await?
            .unwrap_or(0))
    }

    /// `None` when the statement failed only because its object is absent.
    async fn execute_tolerating<F>(
        &self,
        statement: &str,
        params: &[&str],
        absent: Absent,
        operation: F,
    ) -> Result<Option<u64>>
    where
        F: FnOnce() -> String,
    {
        match self.db.execute(statement, params).await {
            Ok(count) => Ok(Some(count)),
            Err(e) if sql::is_absent(&e, absent) => {
                debug!("{}: {:?} does not exist ({})", operation(), absent, e);
                Ok(None)
            }
            Err(e) => Err(DatabaseError::sql(operation(), e)),
        }
    }
}
