mod error;
pub use error::{ExecError, ExecResult};

pub mod config;
pub use config::{BasicAuth, CredentialPolicy, ExecConfig};

pub mod loader;
pub use loader::{LoadFailure, LoadReport, Loader};

pub mod monitor;
pub use monitor::{DaemonExit, MonitorHandle, MonitorStop};

pub mod stream;
pub use stream::{StreamHandle, StreamIo};

mod orchestrator;
pub use orchestrator::{Daemon, DaemonIo, KillOptions, LambdaOutput, Orchestrator};

mod util;
pub use util::available_host_port;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{DaemonIo, ExecConfig, KillOptions, Orchestrator, StreamIo};
}
