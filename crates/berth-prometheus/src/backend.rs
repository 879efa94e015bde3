use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, proto::MetricFamily};

use berth_core::{MetricsBackend, RunOutcome};
use berth_model::RunShape;

/// Lambdas are short; daemons report only their start-up here.
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    started: IntCounterVec,
    finished: IntCounterVec,
    duration: HistogramVec,
    runtime_errors: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the berth collectors into an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let started = IntCounterVec::new(
            Opts::new("berth_runs_started_total", "Container runs started"),
            &["shape"],
        )?;
        let finished = IntCounterVec::new(
            Opts::new("berth_runs_finished_total", "Container runs finished"),
            &["shape", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("berth_run_duration_seconds", "Container run duration")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["shape"],
        )?;
        let runtime_errors = IntCounterVec::new(
            Opts::new("berth_runtime_errors_total", "Failed container runtime calls"),
            &["op"],
        )?;

        registry.register(Box::new(started.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(runtime_errors.clone()))?;

        Ok(Self {
            registry,
            started,
            finished,
            duration,
            runtime_errors,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn run_started(&self, shape: RunShape) {
        self.started.with_label_values(&[shape.as_str()]).inc();
    }

    fn run_finished(&self, shape: RunShape, outcome: RunOutcome, elapsed: Duration) {
        self.finished
            .with_label_values(&[shape.as_str(), outcome.as_str()])
            .inc();
        self.duration
            .with_label_values(&[shape.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    fn runtime_error(&self, op: &'static str) {
        self.runtime_errors.with_label_values(&[op]).inc();
    }
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder};

    use super::*;

    fn render(m: &PrometheusMetrics) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&m.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn records_run_lifecycle() {
        let m = PrometheusMetrics::new().unwrap();
        m.run_started(RunShape::Lambda);
        m.run_started(RunShape::Lambda);
        m.run_finished(RunShape::Lambda, RunOutcome::Success, Duration::from_millis(300));
        m.runtime_error("pull");

        assert_eq!(m.started.with_label_values(&["lambda"]).get(), 2);
        assert_eq!(m.finished.with_label_values(&["lambda", "success"]).get(), 1);
        assert_eq!(m.duration.with_label_values(&["lambda"]).get_sample_count(), 1);

        let text = render(&m);
        assert!(text.contains(r#"berth_runtime_errors_total{op="pull"} 1"#));
        assert!(text.contains("berth_run_duration_seconds_bucket"));
    }

    #[test]
    fn shared_registry_rejects_duplicates() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }

    #[test]
    fn usable_as_metrics_handle() {
        let m = PrometheusMetrics::new().unwrap();
        let handle: berth_core::MetricsHandle = std::sync::Arc::new(m.clone());
        handle.run_started(RunShape::Daemon);
        assert_eq!(m.started.with_label_values(&["daemon"]).get(), 1);
    }
}
