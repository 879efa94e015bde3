use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Credentials sent with fetches to one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Hosts whose staged-input fetches carry basic authentication.
///
/// Matching is on the exact host name of the URL; subdomains are not
/// covered by their parent's entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialPolicy {
    hosts: HashMap<String, BasicAuth>,
}

impl CredentialPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(
        mut self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.hosts.insert(
            host.into().to_ascii_lowercase(),
            BasicAuth {
                username: username.into(),
                password: password.into(),
            },
        );
        self
    }

    pub fn for_host(&self, host: &str) -> Option<&BasicAuth> {
        self.hosts.get(&host.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Host directory under which every daemon gets `<root>/<name>`.
    pub mounts_root: PathBuf,
    /// Second in-container path for daemon directories (default: `/minion`).
    pub legacy_mount_target: Option<String>,
    /// Daemon liveness poll interval (default: 1 second).
    pub monitor_poll_interval_ms: u64,
    /// Read size of stream pumps (default: 512 bytes).
    pub chunk_size: usize,
    /// Per-request timeout for URL-backed inputs (default: 30 seconds).
    pub fetch_timeout_ms: u64,
    pub credentials: CredentialPolicy,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            mounts_root: PathBuf::from("/var/lib/berth/mounts"),
            legacy_mount_target: Some("/minion".to_string()),
            monitor_poll_interval_ms: 1_000,
            chunk_size: 512,
            fetch_timeout_ms: 30_000,
            credentials: CredentialPolicy::default(),
        }
    }
}

impl ExecConfig {
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.mounts_root.as_os_str().is_empty() {
            return Err(ExecError::InvalidConfig("mounts_root is empty".into()));
        }
        if self.monitor_poll_interval_ms == 0 {
            return Err(ExecError::InvalidConfig(
                "monitor_poll_interval_ms must be > 0".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ExecError::InvalidConfig("chunk_size must be > 0".into()));
        }
        match &self.legacy_mount_target {
            Some(target) if !target.starts_with('/') => {
                return Err(ExecError::InvalidConfig(format!(
                    "legacy_mount_target must be absolute: {target}"
                )));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
