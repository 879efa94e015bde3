//! Raw byte pumps between an [`Attachment`] and channels.
//!
//! Output pumps read up to `chunk_size` bytes at a time and forward exactly
//! what was read; chunk boundaries carry no meaning. Any read error,
//! including end of stream, closes the attachment for every pump.

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use berth_core::Attachment;

/// Channel ends a streaming session feeds.
#[derive(Debug)]
pub struct StreamIo {
    pub stdout: mpsc::Sender<Vec<u8>>,
    pub stderr: mpsc::Sender<Vec<u8>>,
    /// Chunks to write to container stdin. `None` keeps stdin open but idle.
    pub stdin: Option<mpsc::Receiver<Vec<u8>>>,
}

/// Running pump tasks of one attachment.
#[derive(Debug)]
pub struct StreamHandle {
    closer: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamHandle {
    /// Close the attachment; pumps exit at their next suspension point.
    pub fn stop(&self) {
        self.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Wait until every pump has exited.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Pump an attachment continuously in all three directions.
pub fn pump(
    container: &str,
    attachment: Attachment,
    io: StreamIo,
    chunk_size: usize,
) -> StreamHandle {
    let Attachment {
        stdout,
        stderr,
        stdin,
        closer,
    } = attachment;

    let mut tasks = vec![
        tokio::spawn(pump_output(
            container.to_string(),
            "stdout",
            stdout,
            io.stdout,
            chunk_size,
            closer.clone(),
        )),
        tokio::spawn(pump_output(
            container.to_string(),
            "stderr",
            stderr,
            io.stderr,
            chunk_size,
            closer.clone(),
        )),
    ];

    tasks.push(match io.stdin {
        Some(rx) => tokio::spawn(pump_input(container.to_string(), stdin, rx, closer.clone())),
        None => {
            let closer = closer.clone();
            tokio::spawn(async move {
                let _stdin = stdin;
                closer.cancelled().await;
            })
        }
    });

    debug!(target: "berth.exec.stream", %container, chunk_size, "streaming attached");
    StreamHandle { closer, tasks }
}

async fn pump_output<R>(
    container: String,
    direction: &'static str,
    mut reader: R,
    out: mpsc::Sender<Vec<u8>>,
    chunk_size: usize,
    closer: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        let read = tokio::select! {
            _ = closer.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                trace!(target: "berth.exec.stream", %container, direction, "end of stream");
                break;
            }
            Ok(n) => {
                if out.send(buf[..n].to_vec()).await.is_err() {
                    trace!(target: "berth.exec.stream", %container, direction, "receiver gone");
                    break;
                }
            }
            Err(e) => {
                debug!(target: "berth.exec.stream", %container, direction, error = %e, "read failed");
                break;
            }
        }
    }
    closer.cancel();
}

async fn pump_input<W>(
    container: String,
    mut writer: W,
    mut input: mpsc::Receiver<Vec<u8>>,
    closer: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let chunk = tokio::select! {
            _ = closer.cancelled() => break,
            chunk = input.recv() => chunk,
        };

        let Some(chunk) = chunk else {
            // Input channel closed; leave outputs running.
            let _ = writer.shutdown().await;
            closer.cancelled().await;
            break;
        };

        let written = async {
            writer.write_all(&chunk).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!(target: "berth.exec.stream", %container, error = %e, "stdin write failed");
            closer.cancel();
            break;
        }
    }
}
