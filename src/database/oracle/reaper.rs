use super::sql;
use crate::database::{DatabaseError, Result, SqlExecutor};
use crate::retry::{Attempt, BoundedRetry, RetryError, RetryPolicy};
use std::fmt;
use tracing::{debug, info, warn};

/// One row of `v$session`. Re-queried on every pass, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSession {
    pub principal: String,
    pub session_id: String,
    pub serial_number: String,
}

enum Poll {
    Surviving(usize),
    Failed(DatabaseError),
}

impl fmt::Display for Poll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Poll::Surviving(n) => write!(f, "{} session(s) still listed", n),
            Poll::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Force-terminates a principal's sessions and waits until they are gone.
pub struct SessionReaper<'a> {
    db: &'a dyn SqlExecutor,
    retry: BoundedRetry,
}

impl<'a> SessionReaper<'a> {
    /// Reaper confirming death under the 10s/1s budget on the real clock.
    pub fn new(db: &'a dyn SqlExecutor) -> Self {
        Self::with_retry(db, BoundedRetry::with_policy(RetryPolicy::session_death()))
    }

    pub fn with_retry(db: &'a dyn SqlExecutor, retry: BoundedRetry) -> Self {
        Self { db, retry }
    }

    /// Sessions currently open for `principal` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns error if the session table cannot be queried.
    pub async fn sessions(&self, principal: &str) -> Result<Vec<DatabaseSession>> {
        let rows = self
            .db
            .query(sql::LIST_SESSIONS, &[principal])
            .await
            .map_err(|e| DatabaseError::sql(format!("list sessions for '{}'", principal), e))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.as_slice() {
                [user, sid, serial, ..] => Some(DatabaseSession {
                    principal: user.clone(),
                    session_id: sid.clone(),
                    serial_number: serial.clone(),
                }),
                other => {
                    warn!("Ignoring malformed session row {:?}", other);
                    None
                }
            })
            .collect())
    }

    /// Kill every session of `principal` and confirm none remain.
    ///
    /// Returns the number of kill commands that succeeded. Per-session kill
    /// failures are ignored: the session may have ended between being listed
    /// and being killed.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::SessionsSurvived`] if sessions are still
    /// listed when the budget is spent, a configuration error for an invalid
    /// principal name, or the SQL error if the session table cannot be read.
    pub async fn reap(&self, principal: &str) -> Result<usize> {
        sql::validate_identifier("user", principal)?;

        let sessions = self.sessions(principal).await?;
        if sessions.is_empty() {
            debug!("No database sessions for '{}'", principal);
            return Ok(0);
        }

        let mut killed = 0;
        for session in &sessions {
            if !sql::is_session_number(&session.session_id)
                || !sql::is_session_number(&session.serial_number)
            {
                warn!(
                    "Skipping session with unexpected SID '{}' / SERIAL '{}'",
                    session.session_id, session.serial_number
                );
                continue;
            }

            info!(
                "Killing database session for USERNAME '{}', SID '{}' and SERIAL '{}'",
                session.principal, session.session_id, session.serial_number
            );

            let statement = sql::kill_session(&session.session_id, &session.serial_number);
            match self.db.execute(&statement, &[]).await {
                Ok(_) => killed += 1,
                Err(e) => debug!("Session {} not killed: {}", session.session_id, e),
            }
        }

        self.wait_for_sessions_to_die(principal).await?;
        Ok(killed)
    }

    async fn wait_for_sessions_to_die(&self, principal: &str) -> Result<()> {
        debug!("Waiting for database sessions to die '{}'", principal);

        let result = self
            .retry
            .execute(|| async move {
                match self.sessions(principal).await {
                    Ok(remaining) if remaining.is_empty() => Ok(()),
                    Ok(remaining) => Err(Attempt::Transient(Poll::Surviving(remaining.len()))),
                    Err(e) => Err(Attempt::Fatal(Poll::Failed(e))),
                }
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Exhausted {
                attempts,
                elapsed,
                last: Poll::Surviving(remaining),
            }) => Err(DatabaseError::SessionsSurvived {
                principal: principal.to_string(),
                remaining,
                attempts,
                elapsed,
            }),
            Err(e) => match e.into_inner() {
                Poll::Failed(e) => Err(e),
                Poll::Surviving(remaining) => Err(DatabaseError::SessionsSurvived {
                    principal: principal.to_string(),
                    remaining,
                    attempts: 0,
                    elapsed: Default::default(),
                }),
            },
        }
    }
}
