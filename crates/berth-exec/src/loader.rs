//! Staging of daemon input files into a host directory.
//!
//! Literal entries are written in turn on the calling task; URL entries are
//! fetched concurrently, one task each, and all of them are joined before
//! [`Loader::load`] returns. No entry's failure stops the others: every
//! outcome lands in the returned [`LoadReport`].

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use reqwest::{Client, Url};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use berth_model::{InputSet, StagedInput};

use crate::{
    config::{CredentialPolicy, ExecConfig},
    error::ExecError,
};

/// One entry that could not be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of staging an [`InputSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub written: Vec<String>,
    pub failed: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, name: &str, reason: impl ToString) {
        self.failed.push(LoadFailure {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct Loader {
    client: Client,
    credentials: Arc<CredentialPolicy>,
}

impl Loader {
    pub fn new(timeout: Duration, credentials: CredentialPolicy) -> Result<Self, ExecError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            credentials: Arc::new(credentials),
        })
    }

    pub fn from_config(cfg: &ExecConfig) -> Result<Self, ExecError> {
        Self::new(cfg.fetch_timeout(), cfg.credentials.clone())
    }

    /// Materialize every entry of `inputs` under `dir`.
    #[instrument(level = "debug", skip(self, inputs), fields(dir = %dir.display(), entries = inputs.len()))]
    pub async fn load(&self, dir: &Path, inputs: &InputSet) -> LoadReport {
        let mut report = LoadReport::default();
        let mut pending: Vec<(String, JoinHandle<Result<(), String>>)> = Vec::new();

        for (name, input) in inputs.iter() {
            let target = match resolve(dir, name) {
                Ok(target) => target,
                Err(reason) => {
                    warn!(target: "berth.exec.loader", file = %name, %reason, "rejected input name");
                    report.fail(name, reason);
                    continue;
                }
            };

            match input {
                StagedInput::Content(bytes) => {
                    info!(target: "berth.exec.loader", file = %name, "writing provided content");
                    match write(&target, bytes).await {
                        Ok(()) => report.written.push(name.clone()),
                        Err(e) => {
                            warn!(target: "berth.exec.loader", file = %name, error = %e, "could not write file");
                            report.fail(name, e);
                        }
                    }
                }
                StagedInput::Fetch(url) => {
                    let client = self.client.clone();
                    let credentials = Arc::clone(&self.credentials);
                    let url = url.clone();
                    let file = name.clone();
                    let handle = tokio::spawn(async move {
                        let bytes = fetch(&client, &credentials, &url).await.map_err(|e| {
                            warn!(target: "berth.exec.loader", %file, %url, error = %e, "could not fetch content");
                            e
                        })?;
                        info!(target: "berth.exec.loader", %file, bytes = bytes.len(), "writing fetched content");
                        write(&target, &bytes).await.map_err(|e| {
                            warn!(target: "berth.exec.loader", %file, error = %e, "could not write file");
                            e.to_string()
                        })
                    });
                    pending.push((name.clone(), handle));
                }
            }
        }

        for (name, handle) in pending {
            match handle.await {
                Ok(Ok(())) => report.written.push(name),
                Ok(Err(reason)) => report.fail(&name, reason),
                Err(e) => report.fail(&name, format!("fetch task failed: {e}")),
            }
        }

        debug!(
            written = report.written.len(),
            failed = report.failed.len(),
            "inputs staged"
        );
        report
    }
}

/// Join `name` onto `dir`, refusing anything that could escape it.
fn resolve(dir: &Path, name: &str) -> Result<PathBuf, String> {
    let rel = Path::new(name);
    if name.is_empty() {
        return Err("empty file name".into());
    }
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(format!("file name must be a plain relative path: {name}"));
    }
    Ok(dir.join(rel))
}

async fn write(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, bytes).await
}

async fn fetch(
    client: &Client,
    credentials: &CredentialPolicy,
    raw: &str,
) -> Result<Vec<u8>, String> {
    let url = Url::parse(raw).map_err(|e| format!("bad url: {e}"))?;

    let mut request = client.get(url.clone());
    if let Some(auth) = url.host_str().and_then(|h| credentials.for_host(h)) {
        request = request.basic_auth(&auth.username, Some(&auth.password));
    }

    let response = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;
    let body = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        http::{HeaderMap, StatusCode, header::AUTHORIZATION},
        routing::get,
    };
    use tokio::net::TcpListener;

    async fn serve() -> String {
        let app = Router::new()
            .route("/x", get(|| async { "fetched bytes" }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/private",
                get(|headers: HeaderMap| async move {
                    match headers.get(AUTHORIZATION) {
                        // "web:secret"
                        Some(v) if v == "Basic d2ViOnNlY3JldA==" => (StatusCode::OK, "private"),
                        _ => (StatusCode::UNAUTHORIZED, "denied"),
                    }
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn loader(credentials: CredentialPolicy) -> Loader {
        Loader::new(Duration::from_secs(5), credentials).unwrap()
    }

    #[tokio::test]
    async fn writes_literal_content() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputSet::new().content("a.txt", "hello");

        let report = loader(CredentialPolicy::new()).load(dir.path(), &inputs).await;

        assert!(report.is_complete());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn fetches_url_content() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputSet::from_raw([("b.txt", format!("{base}/x"))]);

        let report = loader(CredentialPolicy::new()).load(dir.path(), &inputs).await;

        assert_eq!(report.written, vec!["b.txt".to_string()]);
        assert_eq!(
            std::fs::read(dir.path().join("b.txt")).unwrap(),
            b"fetched bytes"
        );
    }

    #[tokio::test]
    async fn failed_fetch_does_not_block_siblings() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputSet::new()
            .content("a.txt", "hello")
            .fetch("b.txt", format!("{base}/missing"));

        let report = loader(CredentialPolicy::new()).load(dir.path(), &inputs).await;

        assert_eq!(report.written, vec!["a.txt".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "b.txt");
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn credentials_are_sent_to_listed_host_only() {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputSet::new().fetch("p.txt", format!("{base}/private"));

        let report = loader(CredentialPolicy::new()).load(dir.path(), &inputs).await;
        assert_eq!(report.failed.len(), 1);

        let policy = CredentialPolicy::new().with_host("127.0.0.1", "web", "secret");
        let report = loader(policy).load(dir.path(), &inputs).await;
        assert!(report.is_complete());
        assert_eq!(std::fs::read(dir.path().join("p.txt")).unwrap(), b"private");
    }

    #[tokio::test]
    async fn unsafe_names_are_rejected_and_nested_ones_created() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputSet::new()
            .content("../escape.txt", "no")
            .content("/abs.txt", "no")
            .content("conf/app.toml", "yes");

        let report = loader(CredentialPolicy::new()).load(dir.path(), &inputs).await;

        assert_eq!(report.written, vec!["conf/app.toml".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("conf/app.toml")).unwrap(),
            b"yes"
        );
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }
}
