//! Shared in-memory daemon and database for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fixture_env::container::{
    ContainerError, ContainerSpec, ContainerSummary, DaemonClient, ExecConfig, ExecOutput,
    ImageSummary, PublishedPort,
};
use fixture_env::database::{ConnectTarget, Connector, Row, SqlError, SqlExecutor};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

type DaemonResult<T> = Result<T, ContainerError>;

fn not_found() -> ContainerError {
    ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
        status_code: 404,
        message: "No such container".to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct MemoryContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub ports: Vec<PublishedPort>,
}

#[derive(Debug, Default)]
struct DaemonState {
    images: Vec<String>,
    containers: Vec<MemoryContainer>,
    calls: Vec<String>,
    next_id: u32,
}

/// Container daemon that keeps everything in memory and always succeeds
/// where a real daemon would.
#[derive(Debug, Default)]
pub struct MemoryDaemon {
    state: Mutex<DaemonState>,
}

impl MemoryDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn containers(&self) -> Vec<MemoryContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl DaemonClient for MemoryDaemon {
    fn ping(&self) -> BoxFuture<'_, DaemonResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn list_images(&self) -> BoxFuture<'_, DaemonResult<Vec<ImageSummary>>> {
        let images = self
            .state
            .lock()
            .unwrap()
            .images
            .iter()
            .map(|tag| ImageSummary {
                id: format!("sha256:{}", tag),
                repo_tags: vec![tag.clone()],
            })
            .collect();
        Box::pin(async move { Ok(images) })
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, DaemonResult<()>> {
        self.record(format!("pull {}", image));
        let tag = fixture_env::container::normalize_image_reference(image);
        self.state.lock().unwrap().images.push(tag);
        Box::pin(async { Ok(()) })
    }

    fn list_containers(&self, all: bool) -> BoxFuture<'_, DaemonResult<Vec<ContainerSummary>>> {
        let containers = self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| all || c.running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                state: if c.running { "running" } else { "exited" }.to_string(),
                status: if c.running { "Up" } else { "Exited (0)" }.to_string(),
                ports: c.ports.clone(),
            })
            .collect();
        Box::pin(async move { Ok(containers) })
    }

    fn create_container<'a>(
        &'a self,
        name: &'a str,
        spec: &'a ContainerSpec,
    ) -> BoxFuture<'a, DaemonResult<String>> {
        self.record(format!("create {}", name));
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("container{}", state.next_id);
            state.containers.push(MemoryContainer {
                id: id.clone(),
                name: name.to_string(),
                running: false,
                ports: spec.published_ports(),
            });
            id
        };
        Box::pin(async move { Ok(id) })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, DaemonResult<()>> {
        self.record(format!("start {}", id));
        let result = match self
            .state
            .lock()
            .unwrap()
            .containers
            .iter_mut()
            .find(|c| c.id == id)
        {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(not_found()),
        };
        Box::pin(async move { result })
    }

    fn kill_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, DaemonResult<()>> {
        self.record(format!("kill {}", id));
        if let Some(c) = self
            .state
            .lock()
            .unwrap()
            .containers
            .iter_mut()
            .find(|c| c.id == id)
        {
            c.running = false;
        }
        Box::pin(async { Ok(()) })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, DaemonResult<()>> {
        self.record(format!("remove {}", id));
        self.state.lock().unwrap().containers.retain(|c| c.id != id);
        Box::pin(async { Ok(()) })
    }

    fn exec<'a>(
        &'a self,
        id: &'a str,
        config: &'a ExecConfig,
    ) -> BoxFuture<'a, DaemonResult<ExecOutput>> {
        self.record(format!("exec {} {}", id, config.cmd.join(" ")));
        Box::pin(async {
            Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        })
    }
}

#[derive(Debug, Clone)]
struct Session {
    user: String,
    sid: String,
    serial: String,
    alive: bool,
}

#[derive(Debug, Default)]
struct Dictionary {
    users: Vec<String>,
    sessions: Vec<Session>,
    statements: Vec<String>,
}

/// Oracle data dictionary reduced to users and sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryOracle {
    dictionary: Arc<Mutex<Dictionary>>,
}

fn ora(code: i32, message: &str) -> SqlError {
    SqlError::new(Some(code), format!("ORA-{:05}: {}", code, message))
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: &str) -> Self {
        self.dictionary.lock().unwrap().users.push(user.to_string());
        self
    }

    pub fn with_session(self, user: &str, sid: &str, serial: &str) -> Self {
        self.dictionary.lock().unwrap().sessions.push(Session {
            user: user.to_string(),
            sid: sid.to_string(),
            serial: serial.to_string(),
            alive: true,
        });
        self
    }

    pub fn users(&self) -> Vec<String> {
        self.dictionary.lock().unwrap().users.clone()
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

    fn run(&self, statement: &str, params: &[&str]) -> Result<(Vec<Row>, u64), SqlError> {
        let mut d = self.dictionary.lock().unwrap();
        d.statements.push(statement.to_string());
        let param = params.first().copied().unwrap_or_default().to_uppercase();

        if statement.starts_with("SELECT username, sid, serial#") {
            let rows = d
                .sessions
                .iter()
                .filter(|s| s.alive && s.user == param)
                .map(|s| vec![s.user.clone(), s.sid.clone(), s.serial.clone()])
                .collect();
            return Ok((rows, 0));
        }
        if statement.starts_with("SELECT synonym_name") {
            return Ok((Vec::new(), 0));
        }
        if statement.starts_with("DELETE FROM DATABASECHANGELOG") {
            return Err(ora(942, "table or view does not exist"));
        }
        if let Some(rest) = statement.strip_prefix("ALTER SYSTEM KILL SESSION '") {
            let (sid, serial) = rest
                .trim_end_matches("' IMMEDIATE")
                .split_once(',')
                .unwrap_or_default();
            return match d
                .sessions
                .iter_mut()
                .find(|s| s.alive && s.sid == sid && s.serial == serial)
            {
                Some(session) => {
                    session.alive = false;
                    Ok((Vec::new(), 0))
                }
                None => Err(ora(30, "User session ID does not exist.")),
            };
        }
        if let Some(rest) = statement.strip_prefix("DROP USER ") {
            let user = rest.trim_end_matches(" CASCADE").to_uppercase();
            if d.sessions.iter().any(|s| s.alive && s.user == user) {
                return Err(ora(1940, "cannot drop a user that is currently connected"));
            }
            let before = d.users.len();
            d.users.retain(|u| *u != user);
            return if d.users.len() < before {
                Ok((Vec::new(), 0))
            } else {
                Err(ora(1918, &format!("user '{}' does not exist", user)))
            };
        }
        if statement.starts_with("DROP TABLESPACE ") {
            return Err(ora(959, "tablespace does not exist"));
        }
        Err(ora(900, "invalid SQL statement"))
    }
}

#[async_trait]
impl SqlExecutor for MemoryOracle {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, SqlError> {
        self.run(sql, params).map(|(rows, _)| rows)
    }

    async fn execute(&self, sql: &str, params: &[&str]) -> Result<u64, SqlError> {
        self.run(sql, params).map(|(_, count)| count)
    }
}

/// Connects every target to the same [`MemoryOracle`].
#[derive(Debug, Default)]
pub struct MemoryConnector {
    pub database: MemoryOracle,
    pub targets: Mutex<Vec<ConnectTarget>>,
}

impl MemoryConnector {
    pub fn new(database: MemoryOracle) -> Self {
        Self {
            database,
            targets: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn SqlExecutor>, SqlError> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(Box::new(self.database.clone()))
    }
}
