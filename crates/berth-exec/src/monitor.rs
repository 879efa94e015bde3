//! Polling liveness supervision of daemonized containers.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use berth_core::{ContainerRuntime, RemoveOptions};

/// Sent once when a monitored daemon is found dead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonExit {
    pub name: String,
    pub id: String,
}

/// Why a monitor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStop {
    /// The container stopped running or could not be inspected.
    Exited,
    /// The handle was stopped before an exit was delivered.
    Cancelled,
}

#[derive(Debug)]
pub struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<MonitorStop>,
}

impl MonitorHandle {
    /// Stop polling. No exit signal is sent and the container is not removed.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> MonitorStop {
        self.task.await.unwrap_or(MonitorStop::Cancelled)
    }
}

/// Start polling `id` every `interval`.
///
/// When the container is no longer running (or inspection fails) it is
/// force-removed, keeping its volumes, and one [`DaemonExit`] is sent on
/// `done`. Stopping the handle while that send waits for room abandons it.
pub fn spawn(
    runtime: Arc<dyn ContainerRuntime>,
    name: impl Into<String>,
    id: impl Into<String>,
    interval: Duration,
    done: mpsc::Sender<DaemonExit>,
) -> MonitorHandle {
    let token = CancellationToken::new();
    let task = tokio::spawn(watch(
        runtime,
        DaemonExit {
            name: name.into(),
            id: id.into(),
        },
        interval,
        done,
        token.clone(),
    ));
    MonitorHandle { token, task }
}

#[instrument(level = "debug", skip_all, fields(name = %exit.name, container = %exit.id))]
async fn watch(
    runtime: Arc<dyn ContainerRuntime>,
    exit: DaemonExit,
    interval: Duration,
    done: mpsc::Sender<DaemonExit>,
    token: CancellationToken,
) -> MonitorStop {
    loop {
        tokio::select! {
            _ = token.cancelled() => return MonitorStop::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }

        let alive = match runtime.inspect_container(&exit.id).await {
            Ok(details) => details.running,
            Err(e) => {
                warn!(target: "berth.exec.monitor", error = %e, "inspect failed");
                false
            }
        };
        if !alive {
            break;
        }
    }

    info!(target: "berth.exec.monitor", "container looks dead");
    if let Err(e) = runtime.remove_container(&exit.id, RemoveOptions::force()).await {
        warn!(target: "berth.exec.monitor", error = %e, "error removing container");
    }

    tokio::select! {
        _ = token.cancelled() => {
            warn!(target: "berth.exec.monitor", "stopped before exit was delivered");
            MonitorStop::Cancelled
        }
        sent = done.send(exit) => {
            if sent.is_err() {
                warn!(target: "berth.exec.monitor", "exit receiver dropped");
            }
            MonitorStop::Exited
        }
    }
}
