use std::{sync::Arc, time::Duration};

use berth_model::RunShape;

/// How a run ended, as far as metrics are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Failure => "failure",
            RunOutcome::Cancelled => "cancelled",
        }
    }
}

/// Sink for orchestration metrics.
///
/// Calls happen on the orchestration path and must not block.
pub trait MetricsBackend: Send + Sync {
    fn run_started(&self, shape: RunShape);
    fn run_finished(&self, shape: RunShape, outcome: RunOutcome, elapsed: Duration);
    fn runtime_error(&self, op: &'static str);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn run_started(&self, _shape: RunShape) {}
    fn run_finished(&self, _shape: RunShape, _outcome: RunOutcome, _elapsed: Duration) {}
    fn runtime_error(&self, _op: &'static str) {}
}

pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
