pub mod error;
pub use error::{CoreError, RuntimeError};

pub mod runtime;
pub use runtime::{
    ALL_INTERFACES, Attachment, ContainerLogs, ContainerRuntime, CreateRequest, PublishedPort,
    RemoveOptions,
};

pub mod filter;
pub use filter::{Predicate, list, with_id, with_label, with_name, with_state};

pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics, RunOutcome, noop_metrics};

#[cfg(any(test, feature = "mock"))]
pub mod mock;
