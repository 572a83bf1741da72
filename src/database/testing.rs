//! In-memory Oracle dictionary used by unit tests.

use crate::database::oracle::sql;
use crate::database::{ConnectTarget, Connector, Row, SqlError, SqlExecutor};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub user: String,
    pub sid: String,
    pub serial: String,
    pub killed: bool,
    /// Listings the session still shows up in after being killed.
    pub lingers: u32,
}

#[derive(Debug, Clone)]
pub struct FakeSynonym {
    pub name: String,
    pub table_owner: String,
}

#[derive(Debug, Default)]
pub struct FakeDictionary {
    pub users: Vec<String>,
    pub sessions: Vec<FakeSession>,
    pub synonyms: Vec<FakeSynonym>,
    pub tablespaces: Vec<String>,
    /// `None` when the change-log table does not exist.
    pub change_log: Option<Vec<String>>,
    /// Statements starting with the prefix fail with the error.
    pub failures: Vec<(String, SqlError)>,
    pub statements: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct FakeOracle {
    pub dictionary: Arc<Mutex<FakeDictionary>>,
}

fn ora(code: i32, message: &str) -> SqlError {
    SqlError::new(Some(code), format!("ORA-{:05}: {}", code, message))
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: &str) -> Self {
        self.dictionary.lock().unwrap().users.push(user.to_uppercase());
        self
    }

    pub fn with_session(self, user: &str, sid: &str, serial: &str, lingers: u32) -> Self {
        self.dictionary.lock().unwrap().sessions.push(FakeSession {
            user: user.to_uppercase(),
            sid: sid.to_string(),
            serial: serial.to_string(),
            killed: false,
            lingers,
        });
        self
    }

    /// Listed once more, but already gone when the kill arrives.
    pub fn with_ended_session(self, user: &str, sid: &str, serial: &str) -> Self {
        self.dictionary.lock().unwrap().sessions.push(FakeSession {
            user: user.to_uppercase(),
            sid: sid.to_string(),
            serial: serial.to_string(),
            killed: true,
            lingers: 1,
        });
        self
    }

    pub fn with_synonym(self, name: &str, table_owner: &str) -> Self {
        self.dictionary.lock().unwrap().synonyms.push(FakeSynonym {
            name: name.to_string(),
            table_owner: table_owner.to_uppercase(),
        });
        self
    }

    pub fn with_tablespace(self, name: &str) -> Self {
        self.dictionary.lock().unwrap().tablespaces.push(name.to_uppercase());
        self
    }

    pub fn with_change_log(self, ids: &[&str]) -> Self {
        self.dictionary.lock().unwrap().change_log =
            Some(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn failing(self, prefix: &str, err: SqlError) -> Self {
        self.dictionary
            .lock()
            .unwrap()
            .failures
            .push((prefix.to_string(), err));
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.dictionary.lock().unwrap().statements.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub fn users(&self) -> Vec<String> {
        self.dictionary.lock().unwrap().users.clone()
    }

    pub fn change_log(&self) -> Option<Vec<String>> {
        self.dictionary.lock().unwrap().change_log.clone()
    }

    fn run(&self, statement: &str, params: &[&str]) -> Result<(Vec<Row>, u64), SqlError> {
        let mut d = self.dictionary.lock().unwrap();
        d.statements.push(statement.to_string());

        if let Some((_, err)) = d.failures.iter().find(|(p, _)| statement.starts_with(p)) {
            return Err(err.clone());
        }

        let param = params.first().copied().unwrap_or_default();

        if statement == sql::LIST_SESSIONS {
            let user = param.to_uppercase();
            let mut rows = Vec::new();
            for session in d.sessions.iter_mut().filter(|s| s.user == user) {
                if !session.killed {
                    rows.push(vec![session.user.clone(), session.sid.clone(), session.serial.clone()]);
                } else if session.lingers > 0 {
                    session.lingers -= 1;
                    rows.push(vec![session.user.clone(), session.sid.clone(), session.serial.clone()]);
                }
            }
            d.sessions.retain(|s| !s.killed || s.lingers > 0);
            return Ok((rows, 0));
        }

        if statement == sql::LIST_PUBLIC_SYNONYMS {
            let owner = param.to_uppercase();
            let rows = d
                .synonyms
                .iter()
                .filter(|s| s.table_owner == owner)
                .map(|s| vec![s.name.clone()])
                .collect();
            return Ok((rows, 0));
        }

        if statement == sql::DELETE_CHANGE_LOG {
            let prefix = param.trim_end_matches('%').to_string();
            let log = d
                .change_log
                .as_mut()
                .ok_or_else(|| ora(942, "table or view does not exist"))?;
            let before = log.len();
            log.retain(|id| !id.starts_with(&prefix));
            return Ok((Vec::new(), (before - log.len()) as u64));
        }

        if let Some(rest) = statement.strip_prefix("ALTER SYSTEM KILL SESSION '") {
            let target = rest.trim_end_matches("' IMMEDIATE");
            let (sid, serial) = target.split_once(',').unwrap_or((target, ""));
            return match d
                .sessions
                .iter_mut()
                .find(|s| s.sid == sid && s.serial == serial && !s.killed)
            {
                Some(session) => {
                    session.killed = true;
                    Ok((Vec::new(), 0))
                }
                None => Err(ora(30, "User session ID does not exist.")),
            };
        }

        if let Some(rest) = statement.strip_prefix("DROP USER ") {
            let user = rest.trim_end_matches(" CASCADE").to_uppercase();
            let before = d.users.len();
            d.users.retain(|u| *u != user);
            return if d.users.len() < before {
                Ok((Vec::new(), 0))
            } else {
                Err(ora(1918, &format!("user '{}' does not exist", user)))
            };
        }

        if let Some(rest) = statement.strip_prefix("DROP PUBLIC SYNONYM ") {
            let name = rest.trim_matches('"').replace("\"\"", "\"");
            let before = d.synonyms.len();
            d.synonyms.retain(|s| s.name != name);
            return if d.synonyms.len() < before {
                Ok((Vec::new(), 0))
            } else {
                Err(ora(1432, "public synonym to be dropped does not exist"))
            };
        }

        if let Some(rest) = statement.strip_prefix("DROP TABLESPACE ") {
            let name = rest
                .trim_end_matches(" INCLUDING CONTENTS AND DATAFILES")
                .to_uppercase();
            let before = d.tablespaces.len();
            d.tablespaces.retain(|t| *t != name);
            return if d.tablespaces.len() < before {
                Ok((Vec::new(), 0))
            } else {
                Err(ora(959, &format!("tablespace '{}' does not exist", name)))
            };
        }

        Err(ora(900, "invalid SQL statement"))
    }
}

#[async_trait]
impl SqlExecutor for FakeOracle {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, SqlError> {
        self.run(sql, params).map(|(rows, _)| rows)
    }

    async fn execute(&self, sql: &str, params: &[&str]) -> Result<u64, SqlError> {
        self.run(sql, params).map(|(_, count)| count)
    }
}

/// Hands out clones of one [`FakeOracle`] and records every target.
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub database: FakeOracle,
    pub targets: Mutex<Vec<ConnectTarget>>,
    /// Connection attempts to refuse before accepting.
    pub refusals: Mutex<u32>,
}

impl FakeConnector {
    pub fn new(database: FakeOracle) -> Self {
        Self {
            database,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn SqlExecutor>, SqlError> {
        self.targets.lock().unwrap().push(target.clone());
        let mut refusals = self.refusals.lock().unwrap();
        if *refusals > 0 {
            *refusals -= 1;
            return Err(ora(12541, "TNS:no listener"));
        }
        Ok(Box::new(self.database.clone()))
    }
}
