//! Boundary to the container runtime.
//!
//! The orchestrator never talks to a daemon directly: it is handed one
//! `Arc<dyn ContainerRuntime>` at construction and shares it with every
//! monitor and stream it spawns. Implementations must therefore be safe to
//! call concurrently from many tasks.

use std::{fmt, pin::Pin};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use berth_model::{ContainerDetails, ContainerSummary, ImageRef, Labels, Mount};

use crate::error::RuntimeError;

/// Host interface every published port binds to.
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// A container port published on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    /// Runtime port key, e.g. `"80/tcp"`.
    pub container: String,
    pub host_ip: String,
    pub host_port: u16,
}

/// Fully translated creation request.
///
/// Built by the orchestrator from a run spec; runtimes only map fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub image: String,
    pub labels: Labels,
    /// Exposed port declarations (`"80/tcp"`).
    pub exposed_ports: Vec<String>,
    pub published: Vec<PublishedPort>,
    /// Runtime-independent mount descriptors.
    pub mounts: Vec<Mount>,
    /// `source:target` bind specifications for the same mounts.
    pub binds: Vec<String>,
    /// Attach stdin/stdout/stderr and keep stdin open.
    pub interactive: bool,
    pub tty: bool,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, image: &ImageRef) -> Self {
        Self {
            name: name.into(),
            image: image.reference(),
            labels: Labels::new(),
            exposed_ports: Vec::new(),
            published: Vec::new(),
            mounts: Vec::new(),
            binds: Vec::new(),
            interactive: true,
            tty: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub force: bool,
    /// Also destroy anonymous volumes attached to the container.
    pub volumes: bool,
}

impl RemoveOptions {
    pub fn force() -> Self {
        Self {
            force: true,
            volumes: false,
        }
    }

    pub fn with_volumes(mut self, volumes: bool) -> Self {
        self.volumes = volumes;
        self
    }
}

/// Everything a container has written so far, split by stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogs {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Live stdio attachment.
///
/// The runtime writes container output into the write ends of two pipes and
/// the caller reads `stdout`/`stderr`; bytes written to `stdin` reach the
/// container. Cancelling `closer` tears the attachment down, after which
/// both readers hit end of stream.
pub struct Attachment {
    pub stdout: Pin<Box<dyn AsyncRead + Send>>,
    pub stderr: Pin<Box<dyn AsyncRead + Send>>,
    pub stdin: Pin<Box<dyn AsyncWrite + Send>>,
    pub closer: CancellationToken,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("closed", &self.closer.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn pull_image(&self, image: &ImageRef) -> Result<(), RuntimeError>;

    /// Create a container and return its runtime identifier.
    async fn create_container(&self, request: &CreateRequest) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// List containers; `all = false` restricts to running ones.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, options: RemoveOptions)
    -> Result<(), RuntimeError>;

    async fn attach_container(&self, id: &str) -> Result<Attachment, RuntimeError>;

    /// Block until the container stops running; returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError>;

    async fn container_logs(&self, id: &str) -> Result<ContainerLogs, RuntimeError>;
}
