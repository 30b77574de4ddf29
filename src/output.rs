pub mod sink;

use crate::model::{Match, OutputConfig};
use std::io::Write;
use tokio::sync::mpsc;

pub use sink::OutputSink;

/// The result stream. Workers push matches; a blocking task drains them into
/// an [`OutputSink`].
#[derive(Clone)]
pub struct OutputChannel {
    inner: std::sync::Arc<OutputInner>,
}

struct OutputInner {
    tx: tokio::sync::Mutex<Option<mpsc::Sender<OutputCommand>>>,
    handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

enum OutputCommand {
    Emit(Match),
}

impl OutputChannel {
    pub fn new(cfg: OutputConfig) -> anyhow::Result<Self> {
        Self::with_writer(cfg, Box::new(std::io::stdout()))
    }

    pub fn with_writer(cfg: OutputConfig, writer: Box<dyn Write + Send>) -> anyhow::Result<Self> {
        let (tx, mut rx) = mpsc::channel(1024);
        let handle = tokio::task::spawn_blocking(move || {
            let mut sink = OutputSink::new(cfg, writer);
            while let Some(cmd) = rx.blocking_recv() {
                if let Err(err) = match cmd {
                    OutputCommand::Emit(found) => sink.write_match(&found),
                } {
                    tracing::error!(error = %err, "failed to write match");
                }
            }
            sink.flush();
        });

        Ok(Self {
            inner: std::sync::Arc::new(OutputInner {
                tx: tokio::sync::Mutex::new(Some(tx)),
                handle: tokio::sync::Mutex::new(Some(handle)),
            }),
        })
    }

    pub async fn emit(&self, found: Match) -> anyhow::Result<()> {
        let guard = self.inner.tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(OutputCommand::Emit(found))
                .await
                .map_err(|err| anyhow::anyhow!("output worker not available: {err}"))?
        } else {
            anyhow::bail!("output worker not available; dropping match");
        }
        Ok(())
    }

    /// Closes the stream and waits until every queued match is written.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.inner.tx.lock().await.take();

        if let Some(handle) = self.inner.handle.lock().await.take() {
            handle
                .await
                .map_err(|err| anyhow::anyhow!("failed to join output worker: {err}"))?;
        }

        Ok(())
    }
}
