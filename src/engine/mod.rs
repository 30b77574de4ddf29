pub mod probe;
pub mod reader;
pub mod shutdown;

use crate::client::{SessionOptions, SmtpSession};
use crate::error::{EnumError, Result};
use crate::input::{prepare_candidate, Candidate};
use crate::model::{Config, Match, Method, RunSummary, TargetSpec, WorkerErrorPolicy};
use crate::output::OutputChannel;
use crate::util::now_millis;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use shutdown::Shutdown;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

type WorkQueue = Arc<Mutex<mpsc::Receiver<Vec<u8>>>>;

/// Runs the probe and the worker pool for every configured target, one
/// target after another.
pub struct Engine {
    cfg: Arc<Config>,
    sink: OutputChannel,
    interrupt: Shutdown,
}

impl Engine {
    pub fn new(cfg: Config, sink: OutputChannel, interrupt: Shutdown) -> Self {
        Self {
            cfg: Arc::new(cfg),
            sink,
            interrupt,
        }
    }

    pub async fn run(&mut self) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::with_capacity(self.cfg.targets.len());
        for target in self.cfg.targets.clone() {
            if self.interrupt.is_triggered() {
                break;
            }
            let summary = self.run_target(&target).await?;
            info!(
                target = %summary.target,
                method = %summary.method,
                candidates = summary.candidates,
                matches = summary.matches,
                retired_workers = summary.retired_workers,
                interrupted = summary.interrupted,
                ms = summary.elapsed_ms,
                "enumeration finished"
            );
            summaries.push(summary);
        }
        Ok(summaries)
    }

    #[instrument(skip_all, fields(target = %target))]
    pub async fn run_target(&self, target: &TargetSpec) -> Result<RunSummary> {
        let start = now_millis();
        let mut words = self.cfg.wordlist.open().await?;
        let (probe, method) = probe::run_probe(target, &self.cfg).await?;

        let threads = self.cfg.threads.max(1);
        let (tx, rx) = mpsc::channel::<Vec<u8>>(threads);
        let queue: WorkQueue = Arc::new(Mutex::new(rx));
        let abort = Shutdown::new();
        let matches = Arc::new(AtomicU64::new(0));

        let mut workers = FuturesUnordered::new();
        for id in 0..threads {
            let worker = Worker {
                id,
                target: target.clone(),
                method,
                cfg: self.cfg.clone(),
                queue: queue.clone(),
                sink: self.sink.clone(),
                interrupt: self.interrupt.clone(),
                abort: abort.clone(),
                matches: matches.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
        }
        // Workers hold the only receivers, so a send fails once all have exited.
        drop(queue);

        let mut candidates = 0u64;
        let mut producer_err = None;
        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown::either(&self.interrupt, &abort) => break,
                line = words.next() => line,
            };
            let line = match line {
                Some(Ok(line)) => line,
                Some(Err(source)) => {
                    producer_err = Some(EnumError::Wordlist {
                        path: self.cfg.wordlist.to_string(),
                        source,
                    });
                    abort.trigger();
                    break;
                }
                None => break,
            };

            let username = match prepare_candidate(&line, method) {
                Candidate::Ready(username) => username,
                Candidate::Blank => continue,
                Candidate::Rejected(reason) => {
                    let candidate = String::from_utf8_lossy(&line);
                    warn!(candidate = %candidate.escape_debug(), reason, "skipping candidate");
                    continue;
                }
            };

            let sent = tokio::select! {
                biased;
                _ = shutdown::either(&self.interrupt, &abort) => break,
                sent = tx.send(username) => sent,
            };
            if sent.is_err() {
                debug!("no workers left to take candidates");
                break;
            }
            candidates += 1;
        }
        drop(tx);

        let mut retired = 0usize;
        let mut fatal = producer_err;
        while let Some(joined) = workers.next().await {
            let outcome = joined.unwrap_or_else(|err| Err(EnumError::Worker(err.to_string())));
            if let Err(err) = outcome {
                retired += 1;
                match self.cfg.on_worker_error {
                    WorkerErrorPolicy::Abort => {
                        fatal.get_or_insert(err);
                    }
                    WorkerErrorPolicy::Continue => {
                        warn!(error = %err, "worker retired");
                    }
                }
            }
        }

        if let Some(err) = fatal {
            error!(error = %err, "enumeration aborted");
            return Err(err);
        }
        if retired == threads {
            return Err(EnumError::WorkersExhausted);
        }

        Ok(RunSummary {
            target: target.to_string(),
            method,
            probe,
            candidates,
            matches: matches.load(Ordering::Relaxed),
            retired_workers: retired,
            interrupted: self.interrupt.is_triggered(),
            elapsed_ms: now_millis() - start,
        })
    }
}

struct Worker {
    id: usize,
    target: TargetSpec,
    method: Method,
    cfg: Arc<Config>,
    queue: WorkQueue,
    sink: OutputChannel,
    interrupt: Shutdown,
    abort: Shutdown,
    matches: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) -> Result<()> {
        let result = self.connect_and_work().await;
        if let Err(err) = &result {
            debug!(worker = self.id, error = %err, "worker failed");
            if self.cfg.on_worker_error == WorkerErrorPolicy::Abort {
                self.abort.trigger();
            }
        }
        result
    }

    async fn connect_and_work(&self) -> Result<()> {
        let mut session =
            SmtpSession::connect(&self.target, &SessionOptions::from(self.cfg.as_ref())).await?;
        debug!(worker = self.id, "worker connected");
        let result = self.work(&mut session).await;
        session.close().await;
        result
    }

    async fn work<S>(&self, session: &mut SmtpSession<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if self.method == Method::Rcpt {
            open_envelope(session, &self.cfg).await?;
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown::either(&self.interrupt, &self.abort) => None,
                word = async { self.queue.lock().await.recv().await } => word,
            };
            let Some(username) = next else {
                return Ok(());
            };

            let reply = session.verify(self.method, &username).await?;
            let username = String::from_utf8_lossy(&username);
            debug!(worker = self.id, %username, code = ?reply.code, "candidate checked");
            if reply.is_positive() {
                self.matches.fetch_add(1, Ordering::Relaxed);
                let found = Match {
                    target: self.target.to_string(),
                    method: self.method,
                    username: username.into_owned(),
                    reply: reply.text,
                };
                self.sink
                    .emit(found)
                    .await
                    .map_err(|err| EnumError::Output(err.to_string()))?;
            }
        }
    }
}

/// RCPT needs a mail transaction; servers answer 503 without one.
async fn open_envelope<S>(session: &mut SmtpSession<S>, cfg: &Config) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let helo = session
        .send_and_read(&format!("HELO {}", cfg.helo_domain))
        .await?;
    if !helo.is_completion() {
        warn!(reply = %helo.text, "HELO rejected");
    }
    let from = session
        .send_and_read(&format!("MAIL FROM:<{}>", cfg.mail_from))
        .await?;
    if !from.is_completion() {
        warn!(reply = %from.text, "MAIL FROM rejected");
    }
    Ok(())
}
