use async_trait::async_trait;
use bollard::{
    Docker,
    container::LogOutput,
    errors::Error as BollardError,
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
        InspectContainerOptions, KillContainerOptionsBuilder, ListContainersOptionsBuilder,
        LogsOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
        WaitContainerOptionsBuilder,
    },
};
use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use berth_core::{
    Attachment, ContainerLogs, ContainerRuntime, CreateRequest, RemoveOptions, RuntimeError,
};
use berth_model::{ContainerDetails, ContainerSummary, ImageRef};

use crate::convert::{attach_options, create_body, details, runtime_error, summary};

const PIPE_CAPACITY: usize = 64 * 1024;

/// [`ContainerRuntime`] over the Docker Engine API.
///
/// The bollard client is cheap to clone and safe to share, so one
/// `DockerRuntime` serves every orchestrator task.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime").finish_non_exhaustive()
    }
}

impl DockerRuntime {
    /// Connect with the platform-local defaults and verify the daemon answers.
    pub async fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("ping failed: {e}")))?;

        info!(target: "berth.docker", "connected to docker daemon");
        Ok(Self { docker })
    }

    /// Use a preconfigured client as is.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(level = "debug", skip(self), fields(image = %image))]
    async fn pull_image(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        let options = CreateImageOptionsBuilder::new()
            .from_image(&image.repository)
            .tag(&image.tag)
            .build();

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(item) = progress.next().await {
            let info = item.map_err(|e| runtime_error("pull", &image.reference(), e))?;
            if let Some(status) = info.status {
                debug!(target: "berth.docker", %status, "pull progress");
            }
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, request), fields(name = %request.name))]
    async fn create_container(&self, request: &CreateRequest) -> Result<String, RuntimeError> {
        let options = CreateContainerOptionsBuilder::new()
            .name(&request.name)
            .build();

        let created = self
            .docker
            .create_container(Some(options), create_body(request))
            .await
            .map_err(|e| runtime_error("create", &request.name, e))?;

        for warning in &created.warnings {
            warn!(target: "berth.docker", name = %request.name, %warning, "create warning");
        }
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| runtime_error("start", id, e))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map(details)
            .map_err(|e| runtime_error("inspect", id, e))
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptionsBuilder::new().all(all).build();
        let raw = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("list containers: {e}")))?;
        Ok(raw.into_iter().map(summary).collect())
    }

    async fn kill_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = KillContainerOptionsBuilder::new().signal("SIGKILL").build();
        self.docker
            .kill_container(id, Some(options))
            .await
            .map_err(|e| runtime_error("kill", id, e))
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptionsBuilder::new()
            .force(options.force)
            .v(options.volumes)
            .build();
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| runtime_error("remove", id, e))
    }

    #[instrument(level = "debug", skip(self))]
    async fn attach_container(&self, id: &str) -> Result<Attachment, RuntimeError> {
        let attached = self
            .docker
            .attach_container(id, Some(attach_options()))
            .await
            .map_err(|e| runtime_error("attach", id, e))?;

        let (stdout_w, stdout_r) = duplex(PIPE_CAPACITY);
        let (stderr_w, stderr_r) = duplex(PIPE_CAPACITY);
        let closer = CancellationToken::new();

        tokio::spawn(demux(
            id.to_string(),
            attached.output,
            stdout_w,
            stderr_w,
            closer.clone(),
        ));

        Ok(Attachment {
            stdout: Box::pin(stdout_r),
            stderr: Box::pin(stderr_r),
            stdin: attached.input,
            closer,
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let options = WaitContainerOptionsBuilder::new()
            .condition("not-running")
            .build();
        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits are reported as errors by the client.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(runtime_error("wait", id, e)),
            None => Err(RuntimeError::api("wait", id, "wait stream closed")),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<ContainerLogs, RuntimeError> {
        let options = LogsOptionsBuilder::new().stdout(true).stderr(true).build();
        let mut stream = self.docker.logs(id, Some(options));

        let mut logs = ContainerLogs::default();
        while let Some(item) = stream.next().await {
            match item.map_err(|e| runtime_error("logs", id, e))? {
                LogOutput::StdErr { message } => logs.stderr.extend_from_slice(&message),
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    logs.stdout.extend_from_slice(&message)
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(logs)
    }
}

/// Split the multiplexed attach stream into the stdout/stderr pipes.
///
/// Dropping the write ends on exit gives readers end of stream.
async fn demux<S>(
    id: String,
    mut output: S,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
    closer: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<LogOutput, BollardError>> + Unpin,
{
    loop {
        let item = tokio::select! {
            _ = closer.cancelled() => break,
            item = output.next() => item,
        };

        let written = match item {
            Some(Ok(LogOutput::StdErr { message })) => stderr.write_all(&message).await,
            Some(Ok(LogOutput::StdOut { message } | LogOutput::Console { message })) => {
                stdout.write_all(&message).await
            }
            Some(Ok(LogOutput::StdIn { .. })) => Ok(()),
            Some(Err(e)) => {
                warn!(target: "berth.docker", container = %id, error = %e, "attach stream failed");
                break;
            }
            None => break,
        };

        if written.is_err() {
            break;
        }
    }

    trace!(target: "berth.docker", container = %id, "attachment closed");
    closer.cancel();
}
