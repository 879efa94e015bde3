use serde::{Deserialize, Serialize};

use crate::{ImageRef, InputSet, Labels, PortMap};

/// Long-lived run with a persistent per-name host directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSpec {
    pub name: String,
    pub image: ImageRef,
    #[serde(default, skip_serializing_if = "PortMap::is_empty")]
    pub ports: PortMap,
    /// Files staged into the daemon directory before start.
    #[serde(default, skip_serializing_if = "InputSet::is_empty")]
    pub files: InputSet,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default)]
    pub restart: bool,
}

impl DaemonSpec {
    pub fn new(name: impl Into<String>, image: ImageRef) -> Self {
        Self {
            name: name.into(),
            image,
            ports: PortMap::new(),
            files: InputSet::new(),
            labels: Labels::new(),
            restart: false,
        }
    }

    pub fn with_ports(mut self, ports: PortMap) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_files(mut self, files: InputSet) -> Self {
        self.files = files;
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
