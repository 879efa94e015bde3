use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Ledger file; created on first open.
    pub path: PathBuf,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("meter.redb"),
        }
    }
}
