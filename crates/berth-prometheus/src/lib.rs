//! Prometheus backend for berth orchestration metrics.
//!
//! [`PrometheusMetrics`] implements [`berth_core::MetricsBackend`] over its
//! own [`Registry`]. Serving `/metrics` is left to the embedding binary:
//!
//! ```rust,ignore
//! let families = metrics.gather();
//! let mut body = Vec::new();
//! TextEncoder::new().encode(&families, &mut body)?;
//! ```
//!
//! ## Metrics
//! - `berth_runs_started_total{shape}` - Counter
//! - `berth_runs_finished_total{shape, outcome}` - Counter
//! - `berth_run_duration_seconds{shape}` - Histogram
//! - `berth_runtime_errors_total{op}` - Counter

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
