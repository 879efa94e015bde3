//! Container lifecycle: pull, create or recover, start, inspect.
//!
//! All runtime access goes through the one `Arc<dyn ContainerRuntime>` the
//! orchestrator was built with; monitors and streams get clones of it.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use berth_core::{
    ALL_INTERFACES, ContainerLogs, ContainerRuntime, CreateRequest, MetricsHandle, Predicate,
    PublishedPort, RemoveOptions, RunOutcome, RuntimeError, list, noop_metrics, with_name,
};
use berth_model::{ContainerSummary, DaemonSpec, Instance, LambdaSpec, Mount, RunShape, RunSpec};

use crate::{
    config::ExecConfig,
    error::{ExecError, ExecResult},
    loader::{LoadReport, Loader},
    monitor::{self, DaemonExit, MonitorHandle},
    stream::{StreamHandle, StreamIo, pump},
};

/// Optional wiring of a daemonized run.
#[derive(Debug, Default)]
pub struct DaemonIo {
    /// Receives one [`DaemonExit`] when the daemon dies; enables monitoring.
    pub done: Option<mpsc::Sender<DaemonExit>>,
    pub stdout: Option<mpsc::Sender<Vec<u8>>>,
    pub stderr: Option<mpsc::Sender<Vec<u8>>>,
}

impl DaemonIo {
    pub fn with_done(mut self, done: mpsc::Sender<DaemonExit>) -> Self {
        self.done = Some(done);
        self
    }

    pub fn with_output(
        mut self,
        stdout: mpsc::Sender<Vec<u8>>,
        stderr: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self
    }
}

/// A started daemon and the tasks attached to it.
#[derive(Debug)]
pub struct Daemon {
    pub instance: Instance,
    pub host_dir: PathBuf,
    /// Outcome of staging the daemon's files; the run proceeds regardless.
    pub staged: LoadReport,
    pub monitor: Option<MonitorHandle>,
    pub stream: Option<StreamHandle>,
}

impl Daemon {
    /// Stop monitoring and streaming; the container keeps running.
    pub fn detach(&self) {
        if let Some(m) = &self.monitor {
            m.stop();
        }
        if let Some(s) = &self.stream {
            s.stop();
        }
    }
}

/// Captured result of a run-to-completion container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LambdaOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KillOptions {
    /// Force-remove the container after killing it.
    pub remove: bool,
    /// Also destroy its volumes when removing.
    pub destroy_data: bool,
}

impl KillOptions {
    pub fn and_remove(destroy_data: bool) -> Self {
        Self {
            remove: true,
            destroy_data,
        }
    }
}

pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    config: ExecConfig,
    loader: Loader,
    metrics: MetricsHandle,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runtime", &self.runtime.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ExecConfig) -> ExecResult<Self> {
        config.validate()?;
        let loader = Loader::from_config(&config)?;
        Ok(Self {
            runtime,
            config,
            loader,
            metrics: noop_metrics(),
        })
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Containers matching `predicate`; `all` includes stopped ones.
    pub async fn list(
        &self,
        predicate: &Predicate,
        all: bool,
    ) -> ExecResult<Vec<ContainerSummary>> {
        Ok(list(self.runtime.as_ref(), predicate, all).await?)
    }

    /// Pull, create (or recover), start and inspect one container.
    pub async fn run(&self, spec: &RunSpec) -> ExecResult<Instance> {
        let started = self.begin(RunShape::Plain);
        let result = self.start_run(spec).await;
        self.finish(RunShape::Plain, started, outcome(&result));
        result
    }

    /// Run a long-lived container with a persistent host directory.
    ///
    /// The directory `<mounts_root>/<name>` is created if needed, the
    /// spec's files are staged into it, and it is mounted at `/<name>` and
    /// at the configured legacy target. A `done` channel enables the
    /// liveness monitor; both output channels enable streaming.
    #[instrument(level = "debug", skip(self, spec, io), fields(name = %spec.name, image = %spec.image))]
    pub async fn run_daemonized(&self, spec: DaemonSpec, io: DaemonIo) -> ExecResult<Daemon> {
        validate_name(&spec.name)?;
        let started = self.begin(RunShape::Daemon);
        let result = self.start_daemon(spec, io).await;
        self.finish(RunShape::Daemon, started, outcome(&result));
        result
    }

    /// Run a container to completion and return its output.
    ///
    /// The container is force-removed together with its volumes on every
    /// path once it has been started, including when this future is dropped
    /// before it completes.
    #[instrument(level = "debug", skip(self, spec, cancel), fields(name = %spec.name, image = %spec.image))]
    pub async fn run_lambda(
        &self,
        spec: &LambdaSpec,
        cancel: &CancellationToken,
    ) -> ExecResult<LambdaOutput> {
        let started = self.begin(RunShape::Lambda);
        let result = self.start_lambda(spec, cancel).await;
        let outcome = match &result {
            Err(ExecError::Cancelled) => RunOutcome::Cancelled,
            other => outcome(other),
        };
        self.finish(RunShape::Lambda, started, outcome);
        result
    }

    /// Kill the single running container matching `predicate`.
    #[instrument(level = "debug", skip(self, predicate))]
    pub async fn kill(&self, predicate: &Predicate, options: KillOptions) -> ExecResult<()> {
        let found = list(self.runtime.as_ref(), predicate, false).await?;
        if found.len() != 1 {
            warn!(target: "berth.exec.run", count = found.len(), "too many or too few matching containers");
            return Err(ExecError::MatchCount {
                expected: 1,
                found: found.len(),
            });
        }
        let id = found[0].id.as_str();

        info!(target: "berth.exec.run", container = %id, "killing container");
        self.observe("kill", self.runtime.kill_container(id).await)
            .map_err(|source| ExecError::Kill {
                id: id.to_string(),
                source,
            })?;

        if options.remove {
            info!(target: "berth.exec.run", container = %id, "removing container");
            let remove = RemoveOptions::force().with_volumes(options.destroy_data);
            self.observe("remove", self.runtime.remove_container(id, remove).await)
                .map_err(|source| ExecError::Remove {
                    id: id.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Attach to a running container and pump stdio through `io`.
    #[instrument(level = "debug", skip(self, io))]
    pub async fn attach(&self, id: &str, io: StreamIo) -> ExecResult<StreamHandle> {
        let attachment = self
            .observe("attach", self.runtime.attach_container(id).await)
            .map_err(|source| ExecError::Attach {
                id: id.to_string(),
                source,
            })?;
        Ok(pump(id, attachment, io, self.config.chunk_size))
    }

    #[instrument(level = "debug", skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    async fn start_run(&self, spec: &RunSpec) -> ExecResult<Instance> {
        info!(target: "berth.exec.run", image = %spec.image, "pulling image");
        self.observe("pull", self.runtime.pull_image(&spec.image).await)
            .map_err(|source| ExecError::Pull {
                image: spec.image.reference(),
                source,
            })?;

        let request = create_request(spec);
        let created = self.runtime.create_container(&request).await;
        let (id, recovered) = match self.observe("create", created) {
            Ok(id) => (id, false),
            Err(source) => {
                error!(target: "berth.exec.run", error = %source, restart = spec.restart, "error creating container");
                if !spec.restart {
                    return Err(ExecError::Create {
                        name: spec.name.clone(),
                        source,
                    });
                }
                info!(target: "berth.exec.run", name = %spec.name, "looking for container");
                let mut found = list(self.runtime.as_ref(), &with_name(&spec.name), true).await?;
                if found.len() != 1 {
                    return Err(ExecError::NotFound {
                        name: spec.name.clone(),
                        found: found.len(),
                    });
                }
                (found.remove(0).id, true)
            }
        };
        info!(target: "berth.exec.run", container = %id, recovered, "created/found container");

        if let Err(source) = self.observe("start", self.runtime.start_container(&id).await) {
            error!(target: "berth.exec.run", container = %id, error = %source, "error starting container");
            if !recovered {
                if let Err(e) = self.runtime.remove_container(&id, PURGE).await {
                    warn!(target: "berth.exec.run", container = %id, error = %e, "error removing container");
                }
            }
            return Err(ExecError::Start { id, source });
        }
        info!(target: "berth.exec.run", container = %id, "container (re-)started");

        let details = match self.runtime.inspect_container(&id).await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(target: "berth.exec.run", container = %id, error = %e, "inspect after start failed");
                None
            }
        };

        Ok(Instance {
            id,
            name: spec.name.clone(),
            recovered,
            details,
        })
    }

    async fn start_daemon(&self, spec: DaemonSpec, io: DaemonIo) -> ExecResult<Daemon> {
        let host_dir = self.config.mounts_root.join(&spec.name);
        tokio::fs::create_dir_all(&host_dir).await?;

        let staged = self.loader.load(&host_dir, &spec.files).await;
        if !staged.is_complete() {
            warn!(target: "berth.exec.run", failed = staged.failed.len(), "some inputs were not staged");
        }

        let mut run = RunSpec::new(spec.name.clone(), spec.image)
            .with_ports(spec.ports)
            .with_restart(spec.restart)
            .with_mount(Mount::new(&host_dir, format!("/{}", spec.name)));
        run.labels = spec.labels;
        if let Some(legacy) = &self.config.legacy_mount_target {
            run = run.with_mount(Mount::new(&host_dir, legacy.clone()));
        }

        let instance = self.start_run(&run).await?;

        let monitor = io.done.map(|done| {
            monitor::spawn(
                Arc::clone(&self.runtime),
                &spec.name,
                &instance.id,
                self.config.poll_interval(),
                done,
            )
        });

        let stream = match (io.stdout, io.stderr) {
            (Some(stdout), Some(stderr)) => {
                let io = StreamIo {
                    stdout,
                    stderr,
                    stdin: None,
                };
                match self.attach(&instance.id, io).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(target: "berth.exec.run", container = %instance.id, error = %e, "could not stream output");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(Daemon {
            instance,
            host_dir,
            staged,
            monitor,
            stream,
        })
    }

    async fn start_lambda(
        &self,
        spec: &LambdaSpec,
        cancel: &CancellationToken,
    ) -> ExecResult<LambdaOutput> {
        let mut run = RunSpec::new(spec.name.clone(), spec.image.clone());
        run.mounts = spec.mounts.clone();

        let instance = self.start_run(&run).await?;
        let guard = RemoveOnDrop::arm(Arc::clone(&self.runtime), &instance.id);
        let result = self.collect(&instance.id, cancel).await;

        guard.disarm();
        if let Err(e) = self.runtime.remove_container(&instance.id, PURGE).await {
            warn!(target: "berth.exec.run", container = %instance.id, error = %e, "error removing container");
        }
        result
    }

    async fn collect(&self, id: &str, cancel: &CancellationToken) -> ExecResult<LambdaOutput> {
        let exit_code = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(target: "berth.exec.run", container = %id, "cancelled while waiting for exit");
                return Err(ExecError::Cancelled);
            }
            code = self.runtime.wait_container(id) => {
                self.observe("wait", code).map_err(|source| {
                    warn!(target: "berth.exec.run", container = %id, error = %source, "error waiting for container to exit");
                    ExecError::Wait { id: id.to_string(), source }
                })?
            }
        };

        let logs = match self.runtime.container_logs(id).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(target: "berth.exec.run", container = %id, error = %e, "error getting container logs");
                ContainerLogs::default()
            }
        };

        info!(
            target: "berth.exec.run",
            container = %id,
            exit_code,
            stdout = logs.stdout.len(),
            stderr = logs.stderr.len(),
            "run done"
        );
        Ok(LambdaOutput {
            stdout: logs.stdout,
            stderr: logs.stderr,
            exit_code,
        })
    }

    fn observe<T>(
        &self,
        op: &'static str,
        result: Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        if result.is_err() {
            self.metrics.runtime_error(op);
        }
        result
    }

    fn begin(&self, shape: RunShape) -> Instant {
        self.metrics.run_started(shape);
        Instant::now()
    }

    fn finish(&self, shape: RunShape, started: Instant, outcome: RunOutcome) {
        self.metrics.run_finished(shape, outcome, started.elapsed());
    }
}

/// Force removal that also destroys volumes.
const PURGE: RemoveOptions = RemoveOptions {
    force: true,
    volumes: true,
};

/// Force-removes a lambda container if its run future is dropped before
/// the inline cleanup ran.
struct RemoveOnDrop {
    runtime: Option<Arc<dyn ContainerRuntime>>,
    id: String,
}

impl RemoveOnDrop {
    fn arm(runtime: Arc<dyn ContainerRuntime>, id: &str) -> Self {
        Self {
            runtime: Some(runtime),
            id: id.to_string(),
        }
    }

    fn disarm(mut self) {
        self.runtime = None;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(target: "berth.exec.run", container = %id, "lambda run dropped, removing container");
                handle.spawn(async move {
                    if let Err(e) = runtime.remove_container(&id, PURGE).await {
                        warn!(target: "berth.exec.run", container = %id, error = %e, "error removing container");
                    }
                });
            }
            Err(_) => {
                error!(
                    target: "berth.exec.run",
                    container = %id,
                    "lambda run dropped outside a runtime, container left behind"
                );
            }
        }
    }
}

fn outcome<T>(result: &ExecResult<T>) -> RunOutcome {
    match result {
        Ok(_) => RunOutcome::Success,
        Err(_) => RunOutcome::Failure,
    }
}

fn create_request(spec: &RunSpec) -> CreateRequest {
    let mut request = CreateRequest::new(spec.name.clone(), &spec.image);
    request.labels = spec.labels.clone();

    for (host, container) in spec.ports.iter() {
        let key = format!("{container}/tcp");
        if !request.exposed_ports.contains(&key) {
            request.exposed_ports.push(key.clone());
        }
        request.published.push(PublishedPort {
            container: key,
            host_ip: ALL_INTERFACES.to_string(),
            host_port: host,
        });
    }

    for mount in &spec.mounts {
        info!(target: "berth.exec.run", source = %mount.source.display(), dest = %mount.target, "preparing mount");
    }
    request.binds = spec.mounts.iter().map(Mount::bind_spec).collect();
    request.mounts = spec.mounts.clone();
    request
}

/// Daemon names become a directory under the mounts root.
fn validate_name(name: &str) -> ExecResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') => Ok(()),
        _ => Err(ExecError::InvalidSpec(format!(
            "daemon name must be a single path segment: {name:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use super::*;
    use berth_core::{
        MetricsBackend, with_id,
        mock::{MockFailure, MockProgram, MockRuntime},
    };
    use berth_model::{ContainerState, ImageRef, InputSet, PortBinding, PortMap};
    use tokio::io::AsyncWriteExt;

    fn setup() -> (Arc<MockRuntime>, Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let rt = Arc::new(MockRuntime::new());
        let cfg = ExecConfig {
            mounts_root: dir.path().to_path_buf(),
            monitor_poll_interval_ms: 10,
            ..ExecConfig::default()
        };
        let orch = Orchestrator::new(rt.clone(), cfg).unwrap();
        (rt, orch, dir)
    }

    fn nginx() -> ImageRef {
        ImageRef::new("nginx", "1.27")
    }

    #[tokio::test]
    async fn run_translates_spec_and_starts() {
        let (rt, orch, _dir) = setup();
        let spec = RunSpec::new("web", nginx())
            .with_ports(PortMap::single(8080, 80))
            .with_mount(Mount::new("/srv/web", "/data"))
            .with_label("owner", "alice");

        let instance = orch.run(&spec).await.unwrap();

        assert!(!instance.recovered);
        assert!(instance.is_running());
        assert_eq!(rt.pulled(), vec!["nginx:1.27".to_string()]);

        let req = &rt.created()[0];
        assert_eq!(req.exposed_ports, vec!["80/tcp".to_string()]);
        assert_eq!(req.published[0].host_ip, "0.0.0.0");
        assert_eq!(req.published[0].host_port, 8080);
        assert_eq!(req.binds, vec!["/srv/web:/data".to_string()]);
        assert!(req.interactive && req.tty);
        assert_eq!(req.labels.get("owner").map(String::as_str), Some("alice"));

        let details = instance.details.unwrap();
        assert_eq!(
            details.ports,
            vec![PortBinding {
                container_port: 80,
                host_port: 8080
            }]
        );
    }

    #[tokio::test]
    async fn pull_failure_creates_nothing() {
        let (rt, orch, _dir) = setup();
        rt.fail(MockFailure::Pull);

        let err = orch.run(&RunSpec::new("web", nginx())).await.unwrap_err();
        assert!(matches!(err, ExecError::Pull { .. }));
        assert!(err.is_fatal_to_run());
        assert!(rt.created().is_empty());
    }

    #[tokio::test]
    async fn create_conflict_without_restart_fails() {
        let (rt, orch, _dir) = setup();
        rt.seed("web", ContainerState::Exited);

        let err = orch.run(&RunSpec::new("web", nginx())).await.unwrap_err();
        assert!(matches!(
            err,
            ExecError::Create {
                source: RuntimeError::Conflict { .. },
                ..
            }
        ));
        assert!(rt.started().is_empty());
    }

    #[tokio::test]
    async fn create_conflict_with_restart_adopts_existing() {
        let (rt, orch, _dir) = setup();
        let existing = rt.seed("web", ContainerState::Exited);

        let spec = RunSpec::new("web", nginx()).with_restart(true);
        let instance = orch.run(&spec).await.unwrap();

        assert!(instance.recovered);
        assert_eq!(instance.id, existing);
        assert_eq!(rt.started(), vec![existing.clone()]);
        assert_eq!(rt.state(&existing), Some(ContainerState::Running));
    }

    #[tokio::test]
    async fn restart_without_single_match_is_not_found() {
        let (rt, orch, _dir) = setup();
        rt.fail(MockFailure::Create);

        let spec = RunSpec::new("web", nginx()).with_restart(true);
        let err = orch.run(&spec).await.unwrap_err();
        assert!(matches!(err, ExecError::NotFound { found: 0, .. }));
        assert!(err.to_string().contains("could not create nor find"));
    }

    #[tokio::test]
    async fn start_failure_removes_created_container() {
        let (rt, orch, _dir) = setup();
        rt.fail(MockFailure::Start);

        let err = orch.run(&RunSpec::new("web", nginx())).await.unwrap_err();
        assert!(matches!(err, ExecError::Start { .. }));
        assert_eq!(rt.created().len(), 1);
        assert!(rt.id_of("web").is_none());
        assert_eq!(rt.removed().len(), 1);
    }

    #[tokio::test]
    async fn start_failure_keeps_recovered_container() {
        let (rt, orch, _dir) = setup();
        let existing = rt.seed("web", ContainerState::Exited);
        rt.fail(MockFailure::Start);

        let spec = RunSpec::new("web", nginx()).with_restart(true);
        assert!(orch.run(&spec).await.is_err());
        assert!(rt.exists(&existing));
        assert!(rt.removed().is_empty());
    }

    #[tokio::test]
    async fn inspect_failure_still_returns_instance() {
        let (rt, orch, _dir) = setup();
        rt.fail(MockFailure::Inspect);

        let instance = orch.run(&RunSpec::new("web", nginx())).await.unwrap();
        assert!(instance.details.is_none());
        assert_eq!(rt.state(&instance.id), Some(ContainerState::Running));
    }

    #[tokio::test]
    async fn lambda_captures_output_and_removes_container() {
        let (rt, orch, _dir) = setup();
        let image = ImageRef::new("job", "1");
        rt.program(&image, MockProgram::exits_with("ok\n", "", 0));

        let out = orch
            .run_lambda(&LambdaSpec::new(image), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.stdout, b"ok\n");
        assert!(out.stderr.is_empty());
        assert_eq!(out.exit_code, 0);

        assert!(orch.list(&Predicate::any(), true).await.unwrap().is_empty());
        let (_, opts) = &rt.removed()[0];
        assert!(opts.force && opts.volumes);
        assert!(rt.created()[0].exposed_ports.is_empty());
    }

    #[tokio::test]
    async fn lambda_reports_non_zero_exit() {
        let (rt, orch, _dir) = setup();
        let image = ImageRef::new("job", "1");
        rt.program(&image, MockProgram::exits_with("", "boom", 2));

        let out = orch
            .run_lambda(&LambdaSpec::named("job", image), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.exit_code, 2);
        assert_eq!(out.stderr, b"boom");
    }

    #[tokio::test]
    async fn cancelled_lambda_is_still_removed() {
        let (rt, orch, _dir) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orch
            .run_lambda(&LambdaSpec::named("forever", nginx()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert!(rt.id_of("forever").is_none());
    }

    #[tokio::test]
    async fn lambda_wait_failure_is_still_removed() {
        let (rt, orch, _dir) = setup();
        rt.fail(MockFailure::Wait);

        let err = orch
            .run_lambda(&LambdaSpec::named("job", nginx()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Wait { .. }));
        assert!(rt.id_of("job").is_none());
    }

    #[tokio::test]
    async fn dropped_lambda_is_still_removed() {
        let (rt, orch, _dir) = setup();
        let cancel = CancellationToken::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            orch.run_lambda(&LambdaSpec::named("job", nginx()), &cancel),
        )
        .await;
        assert!(timed_out.is_err());

        for _ in 0..100 {
            if rt.id_of("job").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rt.id_of("job").is_none());
        let (_, opts) = &rt.removed()[0];
        assert!(opts.force && opts.volumes);
    }

    #[tokio::test]
    async fn kill_requires_exactly_one_match() {
        let (rt, orch, _dir) = setup();
        let a = rt.seed("a", ContainerState::Running);
        rt.seed("b", ContainerState::Running);
        rt.seed("c", ContainerState::Exited);

        let none = orch.kill(&with_name("zzz"), KillOptions::default()).await;
        assert!(matches!(none, Err(ExecError::MatchCount { found: 0, .. })));

        let two = orch.kill(&Predicate::any(), KillOptions::default()).await;
        assert!(matches!(two, Err(ExecError::MatchCount { found: 2, .. })));

        // exited containers are not candidates
        let exited = orch.kill(&with_name("c"), KillOptions::default()).await;
        assert!(matches!(exited, Err(ExecError::MatchCount { found: 0, .. })));
        assert!(rt.killed().is_empty());

        orch.kill(&with_id(a.clone()), KillOptions::default())
            .await
            .unwrap();
        assert_eq!(rt.killed(), vec![a.clone()]);
        assert!(rt.exists(&a));
    }

    #[tokio::test]
    async fn kill_can_remove_and_destroy_data() {
        let (rt, orch, _dir) = setup();
        let a = rt.seed("a", ContainerState::Running);

        orch.kill(&with_name("a"), KillOptions::and_remove(true))
            .await
            .unwrap();
        assert!(!rt.exists(&a));
        assert_eq!(
            rt.removed(),
            vec![(a, RemoveOptions::force().with_volumes(true))]
        );
    }

    #[tokio::test]
    async fn daemon_stages_files_mounts_twice_and_is_monitored() {
        let (rt, orch, dir) = setup();
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let spec = DaemonSpec::new("svc", nginx())
            .with_files(InputSet::new().content("index.html", "<h1>hi</h1>"));

        let daemon = orch
            .run_daemonized(spec, DaemonIo::default().with_done(done_tx))
            .await
            .unwrap();

        let host_dir = dir.path().join("svc");
        assert_eq!(daemon.host_dir, host_dir);
        assert!(daemon.staged.is_complete());
        assert_eq!(
            std::fs::read(host_dir.join("index.html")).unwrap(),
            b"<h1>hi</h1>"
        );

        let targets: Vec<_> = rt.created()[0]
            .mounts
            .iter()
            .map(|m| m.target.clone())
            .collect();
        assert_eq!(targets, vec!["/svc".to_string(), "/minion".to_string()]);
        assert!(daemon.stream.is_none());

        rt.set_state(&daemon.instance.id, ContainerState::Exited);
        let exit = done_rx.recv().await.unwrap();
        assert_eq!(exit.name, "svc");
        daemon.monitor.unwrap().join().await;
        assert!(!rt.exists(&daemon.instance.id));
    }

    #[tokio::test]
    async fn daemon_proceeds_after_failed_staging() {
        let (_rt, orch, _dir) = setup();
        let spec = DaemonSpec::new("svc", nginx())
            .with_files(InputSet::new().content("../x", "nope"));

        let daemon = orch
            .run_daemonized(spec, DaemonIo::default())
            .await
            .unwrap();
        assert_eq!(daemon.staged.failed.len(), 1);
        assert!(daemon.instance.is_running());
        assert!(daemon.monitor.is_none());
    }

    #[tokio::test]
    async fn daemon_name_must_be_one_segment() {
        let (rt, orch, _dir) = setup();
        for name in ["", "..", "a/b", "/abs"] {
            let err = orch
                .run_daemonized(DaemonSpec::new(name, nginx()), DaemonIo::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ExecError::InvalidSpec(_)), "{name:?}");
        }
        assert!(rt.pulled().is_empty());
    }

    #[tokio::test]
    async fn daemon_streams_output() {
        let (rt, orch, _dir) = setup();
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);

        let daemon = orch
            .run_daemonized(
                DaemonSpec::new("svc", nginx()),
                DaemonIo::default().with_output(out_tx, err_tx),
            )
            .await
            .unwrap();

        let mut console = rt.take_console(&daemon.instance.id).unwrap();
        console.stdout.write_all(b"ready\n").await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), b"ready\n");

        daemon.detach();
        daemon.stream.unwrap().join().await;
        assert!(rt.exists(&daemon.instance.id));
    }

    #[tokio::test]
    async fn attach_pumps_all_directions() {
        let (rt, orch, _dir) = setup();
        let id = rt.seed("svc", ContainerState::Running);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);

        let handle = orch
            .attach(
                &id,
                StreamIo {
                    stdout: out_tx,
                    stderr: err_tx,
                    stdin: Some(in_rx),
                },
            )
            .await
            .unwrap();
        let mut console = rt.take_console(&id).unwrap();

        console.stdout.write_all(b"$ ").await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), b"$ ");
        console.stderr.write_all(b"warn").await.unwrap();
        assert_eq!(err_rx.recv().await.unwrap(), b"warn");

        in_tx.send(b"exit\n".to_vec()).await.unwrap();
        let mut buf = [0u8; 5];
        tokio::io::AsyncReadExt::read_exact(&mut console.stdin, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"exit\n");

        handle.stop();
        handle.join().await;
    }

    #[tokio::test]
    async fn attach_unknown_container_fails() {
        let (_rt, orch, _dir) = setup();
        let (out_tx, _o) = mpsc::channel(1);
        let (err_tx, _e) = mpsc::channel(1);
        let err = orch
            .attach(
                "nope",
                StreamIo {
                    stdout: out_tx,
                    stderr: err_tx,
                    stdin: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Attach { .. }));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl MetricsBackend for Recorder {
        fn run_started(&self, shape: RunShape) {
            self.0.lock().unwrap().push(format!("start {}", shape.as_str()));
        }
        fn run_finished(&self, shape: RunShape, outcome: RunOutcome, _elapsed: Duration) {
            self.0
                .lock()
                .unwrap()
                .push(format!("finish {} {}", shape.as_str(), outcome.as_str()));
        }
        fn runtime_error(&self, op: &'static str) {
            self.0.lock().unwrap().push(format!("error {op}"));
        }
    }

    #[tokio::test]
    async fn metrics_see_runs_and_runtime_errors() {
        let (rt, orch, _dir) = setup();
        let recorder = Arc::new(Recorder::default());
        let orch = orch.with_metrics(recorder.clone());

        orch.run(&RunSpec::new("web", nginx())).await.unwrap();
        rt.fail(MockFailure::Pull);
        orch.run(&RunSpec::new("db", nginx())).await.unwrap_err();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                "start plain",
                "finish plain success",
                "start plain",
                "error pull",
                "finish plain failure",
            ]
        );
    }
}
