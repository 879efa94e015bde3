//! Runs one metered lambda against the local Docker daemon.
//!
//! ```text
//! berth-agentd <identity> [image] [budget-ms]
//! ```

use std::{sync::Arc, time::Instant};

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use berth_docker::DockerRuntime;
use berth_exec::prelude::*;
use berth_meter::{InitPolicy, Ledger, MeterConfig};
use berth_model::{ImageRef, LambdaSpec};
use berth_observe::{LoggerConfig, logger_init};
use berth_prometheus::{Encoder, PrometheusMetrics, TextEncoder};

const DEFAULT_BUDGET_MS: i64 = 60_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::from_env()?)?;

    let mut args = std::env::args().skip(1);
    let Some(identity) = args.next() else {
        bail!("usage: berth-agentd <identity> [image] [budget-ms]");
    };
    let image: ImageRef = args
        .next()
        .unwrap_or_else(|| "hello-world:latest".to_string())
        .parse()?;
    let budget = match args.next() {
        Some(v) => v.parse::<i64>().context("budget-ms must be an integer")?,
        None => DEFAULT_BUDGET_MS,
    };

    let ledger = Ledger::from_config(&MeterConfig::default())?;
    let meter = ledger.new_meter(&identity, budget, InitPolicy::Keep)?;
    let remaining = meter.milliseconds_remaining()?;
    if remaining <= 0 {
        bail!("{identity} has no budget left ({remaining} ms)");
    }

    let metrics = PrometheusMetrics::new()?;
    let runtime = DockerRuntime::connect().await?;
    let orchestrator = Orchestrator::new(Arc::new(runtime), ExecConfig::default())?
        .with_metrics(Arc::new(metrics.clone()));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let spec = LambdaSpec::new(image);
    let started = Instant::now();
    let result = orchestrator.run_lambda(&spec, &cancel).await;
    let elapsed = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    let status = meter.record_milliseconds(elapsed)?;
    info!(
        %identity,
        elapsed_ms = elapsed,
        remaining_ms = status.milliseconds_remaining,
        used_ms = status.milliseconds_used,
        "usage recorded"
    );

    let output = result?;
    print!("{}", String::from_utf8_lossy(&output.stdout));
    eprint!("{}", String::from_utf8_lossy(&output.stderr));

    let mut buf = Vec::new();
    TextEncoder::new().encode(&metrics.gather(), &mut buf)?;
    tracing::debug!(metrics = %String::from_utf8_lossy(&buf), "metrics snapshot");

    if output.exit_code != 0 {
        bail!("{} exited with {}", spec.name, output.exit_code);
    }
    Ok(())
}
