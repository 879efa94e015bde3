use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

/// Arbitrary key/value metadata attached to a container at creation.
pub type Labels = HashMap<String, String>;

/// Bind mount of a host path into the container.
///
/// Mounts are kept as a list so one host directory can appear under
/// several container paths at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
}

impl Mount {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// `source:target` bind specification.
    pub fn bind_spec(&self) -> String {
        format!("{}:{}", self.source.display(), self.target)
    }
}

/// Host port -> container port (TCP).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMap(pub BTreeMap<u16, u16>);

impl PortMap {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn single(host: u16, container: u16) -> Self {
        let mut map = Self::new();
        map.insert(host, container);
        map
    }

    pub fn insert(&mut self, host: u16, container: u16) {
        self.0.insert(host, container);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate `(host, container)` pairs in host port order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.0.iter().map(|(h, c)| (*h, *c))
    }
}
