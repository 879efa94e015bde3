use serde::{Deserialize, Serialize};

use crate::{ImageRef, Labels, Mount, PortMap};

/// Lifecycle shape of a run.
///
/// Used for logging and metrics labels:
/// - `"plain"` for a bare create/start
/// - `"daemon"` for long-lived, monitored runs
/// - `"lambda"` for run-to-completion captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunShape {
    Plain,
    Daemon,
    Lambda,
}

impl RunShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunShape::Plain => "plain",
            RunShape::Daemon => "daemon",
            RunShape::Lambda => "lambda",
        }
    }
}

/// Caller-supplied description of one container run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    /// Logical name; unique among active containers of the same group.
    pub name: String,
    pub image: ImageRef,
    #[serde(default, skip_serializing_if = "PortMap::is_empty")]
    pub ports: PortMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Adopt an existing container with the same name when creation fails.
    #[serde(default)]
    pub restart: bool,
}

impl RunSpec {
    pub fn new(name: impl Into<String>, image: ImageRef) -> Self {
        Self {
            name: name.into(),
            image,
            ports: PortMap::new(),
            mounts: Vec::new(),
            labels: Labels::new(),
            restart: false,
        }
    }

    pub fn with_ports(mut self, ports: PortMap) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }
}
