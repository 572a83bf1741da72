//! In-memory daemon used by unit tests.

use crate::container::{
    ContainerError, ContainerSpec, ContainerSummary, DaemonClient, ExecConfig, ExecOutput,
    ImageSummary, Result,
};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub spec: Option<ContainerSpec>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub images: Vec<ImageSummary>,
    pub containers: Vec<FakeContainer>,
    pub calls: Vec<String>,
    pub start_failures: VecDeque<ContainerError>,
    pub exec_results: VecDeque<Result<ExecOutput>>,
    pub fail_pull: bool,
    pub fail_create: bool,
    next_id: u32,
}

#[derive(Debug, Default)]
pub struct FakeDaemon {
    pub state: Mutex<FakeState>,
}

pub fn server_error(status_code: u16, message: &str) -> ContainerError {
    ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    })
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, tag: &str) -> Self {
        self.state.lock().unwrap().images.push(ImageSummary {
            id: format!("sha256:{}", tag),
            repo_tags: vec![tag.to_string()],
        });
        self
    }

    pub fn with_container(self, name: &str, running: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("stale{}", state.next_id);
            state.containers.push(FakeContainer {
                id,
                name: name.to_string(),
                image: "unknown".to_string(),
                running,
                spec: None,
            });
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl DaemonClient for FakeDaemon {
    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn list_images(&self) -> BoxFuture<'_, Result<Vec<ImageSummary>>> {
        self.record("list_images".to_string());
        let images = self.state.lock().unwrap().images.clone();
        Box::pin(async move { Ok(images) })
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> BoxFuture<'a, Result<()>> {
        self.record(format!("pull {}", image));
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.fail_pull {
                Err(server_error(404, "manifest unknown"))
            } else {
                state.images.push(ImageSummary {
                    id: format!("sha256:{}", image),
                    repo_tags: vec![crate::container::normalize_image_reference(image)],
                });
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn list_containers(&self, all: bool) -> BoxFuture<'_, Result<Vec<ContainerSummary>>> {
        self.record(format!("list_containers all={}", all));
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
                status: if c.running { "Up 1 second" } else { "Exited (0)" }.to_string(),
                ports: c
                    .spec
                    .as_ref()
                    .map(ContainerSpec::published_ports)
                    .unwrap_or_default(),
            })
            .collect();
        Box::pin(async move { Ok(containers) })
    }

    fn create_container<'a>(
        &'a self,
        name: &'a str,
        spec: &'a ContainerSpec,
    ) -> BoxFuture<'a, Result<String>> {
        self.record(format!("create {}", name));
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.fail_create || state.containers.iter().any(|c| c.name == name) {
                Err(server_error(409, "Conflict. The container name is already in use"))
            } else {
                state.next_id += 1;
                let id = format!("id{}", state.next_id);
                state.containers.push(FakeContainer {
                    id: id.clone(),
                    name: name.to_string(),
                    image: spec.image.clone(),
                    running: false,
                    spec: Some(spec.clone()),
                });
                Ok(id)
            }
        };
        Box::pin(async move { result })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.record(format!("start {}", id));
        let result = {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.start_failures.pop_front() {
                Err(err)
            } else if let Some(c) = state.containers.iter_mut().find(|c| c.id == id) {
                c.running = true;
                Ok(())
            } else {
                Err(server_error(404, "No such container"))
            }
        };
        Box::pin(async move { result })
    }

    fn kill_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.record(format!("kill {}", id));
        let result = {
            let mut state = self.state.lock().unwrap();
            match state.containers.iter_mut().find(|c| c.id == id) {
                Some(c) if c.running => {
                    c.running = false;
                    Ok(())
                }
                Some(_) => Err(server_error(409, "Container is not running")),
                None => Err(server_error(404, "No such container")),
            }
        };
        Box::pin(async move { result })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.record(format!("remove {}", id));
        let result = {
            let mut state = self.state.lock().unwrap();
            let before = state.containers.len();
            state.containers.retain(|c| c.id != id);
            if state.containers.len() == before {
                Err(server_error(404, "No such container"))
            } else {
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn exec<'a>(&'a self, id: &'a str, config: &'a ExecConfig) -> BoxFuture<'a, Result<ExecOutput>> {
        self.record(format!("exec {} {}", id, config.cmd.join(" ")));
        let result = self
            .state
            .lock()
            .unwrap()
            .exec_results
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: Some(0),
                })
            });
        Box::pin(async move { result })
    }
}
