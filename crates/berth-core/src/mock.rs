//! In-memory [`ContainerRuntime`] for tests.
//!
//! Containers live in a vector guarded by a mutex. Images can be given a
//! [`MockProgram`] deciding what a container does once started; every call
//! is journalled so tests can assert on pulls, kills and removals.
//!
//! Attach hands the caller real pipes. The far ends are kept as a
//! [`MockConsole`] which tests take with [`MockRuntime::take_console`];
//! dropping the console ends the attachment's output streams.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::{
    io::{DuplexStream, duplex},
    sync::Notify,
};
use tokio_util::sync::CancellationToken;

use berth_model::{ContainerDetails, ContainerState, ContainerSummary, ImageRef, PortBinding};

use crate::{
    error::RuntimeError,
    runtime::{Attachment, ContainerLogs, ContainerRuntime, CreateRequest, RemoveOptions},
};

const PIPE_CAPACITY: usize = 64 * 1024;
const KILLED_EXIT_CODE: i64 = 137;

/// Runtime operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    Pull,
    Create,
    Start,
    Inspect,
    List,
    Kill,
    Remove,
    Attach,
    Wait,
    Logs,
}

/// Behaviour of a container once started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockProgram {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
    /// `true` if the container exits as soon as it starts.
    pub exits: bool,
}

impl MockProgram {
    /// Keeps running until killed or moved by [`MockRuntime::set_state`].
    pub fn long_running() -> Self {
        Self::default()
    }

    pub fn exits_with(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, code: i64) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: code,
            exits: true,
        }
    }
}

/// Test-side ends of an attachment.
#[derive(Debug)]
pub struct MockConsole {
    /// Write here to produce container stdout.
    pub stdout: DuplexStream,
    /// Write here to produce container stderr.
    pub stderr: DuplexStream,
    /// Read here what the caller sent to stdin.
    pub stdin: DuplexStream,
    pub closer: CancellationToken,
}

#[derive(Debug, Clone)]
struct MockContainer {
    id: String,
    name: String,
    image: String,
    labels: HashMap<String, String>,
    state: ContainerState,
    program: MockProgram,
    ports: Vec<PortBinding>,
}

impl MockContainer {
    fn summary(&self) -> ContainerSummary {
        let mut summary = ContainerSummary::new(&self.id)
            .with_name(&self.name)
            .with_state(self.state);
        summary.labels = self.labels.clone();
        summary.image = Some(self.image.clone());
        summary
    }

    fn details(&self) -> ContainerDetails {
        ContainerDetails {
            id: self.id.clone(),
            name: format!("/{}", self.name),
            state: Some(self.state),
            running: self.state == ContainerState::Running,
            exit_code: self.state.is_terminal().then_some(self.program.exit_code),
            ports: self.ports.clone(),
        }
    }
}

#[derive(Default)]
struct Inner {
    containers: Vec<MockContainer>,
    programs: HashMap<String, MockProgram>,
    failures: HashSet<MockFailure>,
    consoles: HashMap<String, MockConsole>,
    next_id: u64,

    pulled: Vec<String>,
    created: Vec<CreateRequest>,
    started: Vec<String>,
    killed: Vec<String>,
    removed: Vec<(String, RemoveOptions)>,
}

impl Inner {
    fn check(&self, op: MockFailure, target: &str) -> Result<(), RuntimeError> {
        if !self.failures.contains(&op) {
            return Ok(());
        }
        match op {
            MockFailure::List => Err(RuntimeError::Unavailable("mock listing disabled".into())),
            _ => Err(RuntimeError::api(
                op_name(op),
                target,
                "injected mock failure",
            )),
        }
    }

    fn find(&self, id: &str) -> Result<&MockContainer, RuntimeError> {
        self.containers
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::not_found(format!("container {id}")))
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut MockContainer, RuntimeError> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RuntimeError::not_found(format!("container {id}")))
    }

    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("mock-{:04}", self.next_id)
    }
}

fn op_name(op: MockFailure) -> &'static str {
    match op {
        MockFailure::Pull => "pull",
        MockFailure::Create => "create",
        MockFailure::Start => "start",
        MockFailure::Inspect => "inspect",
        MockFailure::List => "list",
        MockFailure::Kill => "kill",
        MockFailure::Remove => "remove",
        MockFailure::Attach => "attach",
        MockFailure::Wait => "wait",
        MockFailure::Logs => "logs",
    }
}

#[derive(Default)]
pub struct MockRuntime {
    inner: Mutex<Inner>,
    changed: Notify,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock runtime state poisoned")
    }

    /// Insert an existing container directly; returns its id.
    pub fn seed(&self, name: &str, state: ContainerState) -> String {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.containers.push(MockContainer {
            id: id.clone(),
            name: name.to_string(),
            image: "seed:latest".to_string(),
            labels: HashMap::new(),
            state,
            program: MockProgram::long_running(),
            ports: Vec::new(),
        });
        id
    }

    /// Behaviour of containers created from `image` from now on.
    pub fn program(&self, image: &ImageRef, program: MockProgram) {
        self.lock().programs.insert(image.reference(), program);
    }

    pub fn fail(&self, op: MockFailure) {
        self.lock().failures.insert(op);
    }

    pub fn heal(&self, op: MockFailure) {
        self.lock().failures.remove(&op);
    }

    /// Move a container to `state`, waking waiters.
    pub fn set_state(&self, id: &str, state: ContainerState) {
        if let Ok(c) = self.lock().find_mut(id) {
            c.state = state;
        }
        self.changed.notify_waiters();
    }

    pub fn state(&self, id: &str) -> Option<ContainerState> {
        self.lock().find(id).ok().map(|c| c.state)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.lock().find(id).is_ok()
    }

    pub fn id_of(&self, name: &str) -> Option<String> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.clone())
    }

    pub fn take_console(&self, id: &str) -> Option<MockConsole> {
        self.lock().consoles.remove(id)
    }

    pub fn pulled(&self) -> Vec<String> {
        self.lock().pulled.clone()
    }

    pub fn created(&self) -> Vec<CreateRequest> {
        self.lock().created.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.lock().killed.clone()
    }

    pub fn removed(&self) -> Vec<(String, RemoveOptions)> {
        self.lock().removed.clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        inner.check(MockFailure::Pull, &image.reference())?;
        inner.pulled.push(image.reference());
        Ok(())
    }

    async fn create_container(&self, request: &CreateRequest) -> Result<String, RuntimeError> {
        let mut inner = self.lock();
        inner.check(MockFailure::Create, &request.name)?;
        if inner.containers.iter().any(|c| c.name == request.name) {
            return Err(RuntimeError::Conflict {
                target: format!("container name /{}", request.name),
            });
        }

        let id = inner.next_id();
        let program = inner
            .programs
            .get(&request.image)
            .cloned()
            .unwrap_or_default();
        let ports = request
            .published
            .iter()
            .filter_map(|p| {
                let container_port = p.container.split('/').next()?.parse().ok()?;
                Some(PortBinding {
                    container_port,
                    host_port: p.host_port,
                })
            })
            .collect();

        inner.containers.push(MockContainer {
            id: id.clone(),
            name: request.name.clone(),
            image: request.image.clone(),
            labels: request.labels.clone(),
            state: ContainerState::Created,
            program,
            ports,
        });
        inner.created.push(request.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        {
            let mut inner = self.lock();
            inner.check(MockFailure::Start, id)?;
            let c = inner.find_mut(id)?;
            c.state = if c.program.exits {
                ContainerState::Exited
            } else {
                ContainerState::Running
            };
            inner.started.push(id.to_string());
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let inner = self.lock();
        inner.check(MockFailure::Inspect, id)?;
        Ok(inner.find(id)?.details())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let inner = self.lock();
        inner.check(MockFailure::List, "containers")?;
        Ok(inner
            .containers
            .iter()
            .filter(|c| all || c.state == ContainerState::Running)
            .map(MockContainer::summary)
            .collect())
    }

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeError> {
        {
            let mut inner = self.lock();
            inner.check(MockFailure::Kill, id)?;
            let c = inner.find_mut(id)?;
            c.state = ContainerState::Exited;
            c.program.exit_code = KILLED_EXIT_CODE;
            inner.killed.push(id.to_string());
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        {
            let mut inner = self.lock();
            inner.check(MockFailure::Remove, id)?;
            let running = inner.find(id)?.state == ContainerState::Running;
            if running && !options.force {
                return Err(RuntimeError::api("remove", id, "container is running"));
            }
            inner.containers.retain(|c| c.id != id);
            inner.consoles.remove(id);
            inner.removed.push((id.to_string(), options));
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn attach_container(&self, id: &str) -> Result<Attachment, RuntimeError> {
        let mut inner = self.lock();
        inner.check(MockFailure::Attach, id)?;
        inner.find(id)?;

        let (stdout_far, stdout) = duplex(PIPE_CAPACITY);
        let (stderr_far, stderr) = duplex(PIPE_CAPACITY);
        let (stdin, stdin_far) = duplex(PIPE_CAPACITY);
        let closer = CancellationToken::new();

        inner.consoles.insert(
            id.to_string(),
            MockConsole {
                stdout: stdout_far,
                stderr: stderr_far,
                stdin: stdin_far,
                closer: closer.clone(),
            },
        );

        Ok(Attachment {
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
            stdin: Box::pin(stdin),
            closer,
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        loop {
            let notified = self.changed.notified();
            {
                let inner = self.lock();
                inner.check(MockFailure::Wait, id)?;
                let c = inner.find(id)?;
                if c.state != ContainerState::Running {
                    return Ok(c.program.exit_code);
                }
            }
            notified.await;
        }
    }

    async fn container_logs(&self, id: &str) -> Result<ContainerLogs, RuntimeError> {
        let inner = self.lock();
        inner.check(MockFailure::Logs, id)?;
        let c = inner.find(id)?;
        Ok(ContainerLogs {
            stdout: c.program.stdout.clone(),
            stderr: c.program.stderr.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_conflicts_on_duplicate_name() {
        let rt = MockRuntime::new();
        let img = ImageRef::new("alpine", "latest");
        rt.create_container(&CreateRequest::new("web", &img))
            .await
            .unwrap();

        let err = rt
            .create_container(&CreateRequest::new("web", &img))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Conflict { .. }));
    }

    #[tokio::test]
    async fn started_program_exits_and_wait_returns_code() {
        let rt = MockRuntime::new();
        let img = ImageRef::new("job", "1");
        rt.program(&img, MockProgram::exits_with("ok\n", "", 3));

        let id = rt
            .create_container(&CreateRequest::new("job", &img))
            .await
            .unwrap();
        rt.start_container(&id).await.unwrap();

        assert_eq!(rt.state(&id), Some(ContainerState::Exited));
        assert_eq!(rt.wait_container(&id).await.unwrap(), 3);
        assert_eq!(rt.container_logs(&id).await.unwrap().stdout, b"ok\n");
    }

    #[tokio::test]
    async fn wait_wakes_on_state_change() {
        let rt = std::sync::Arc::new(MockRuntime::new());
        let id = rt.seed("svc", ContainerState::Running);

        let waiter = {
            let rt = rt.clone();
            let id = id.clone();
            tokio::spawn(async move { rt.wait_container(&id).await })
        };
        tokio::task::yield_now().await;
        rt.set_state(&id, ContainerState::Exited);

        assert_eq!(waiter.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn remove_requires_force_for_running() {
        let rt = MockRuntime::new();
        let id = rt.seed("svc", ContainerState::Running);

        assert!(rt.remove_container(&id, RemoveOptions::default()).await.is_err());
        rt.remove_container(&id, RemoveOptions::force()).await.unwrap();
        assert!(!rt.exists(&id));
        assert_eq!(rt.removed(), vec![(id, RemoveOptions::force())]);
    }
}
