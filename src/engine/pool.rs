// src/engine/pool.rs

//! Worker pool for accepted (event, rule) jobs.
//!
//! - Jobs enter through a bounded queue. A full queue makes `submit` back
//!   off exponentially instead of dropping the job.
//! - A runner task moves queued jobs into a `JoinSet`, so a slow job (long
//!   settle time, slow backend) never stalls ingestion.
//! - Action execution is bounded separately by a semaphore of action slots;
//!   jobs take a slot only after their settle wait.
//!
//! The queue bound applies to the hand-off between `submit` and the runner,
//! not to the number of jobs in flight: a job waiting out its settle time
//! holds no slot, and a cascading job submits further jobs while it runs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::errors::{Result, TriggerError};
use crate::exec::BoxFuture;

pub type Job = BoxFuture<'static, ()>;

const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Decrements the pending counter when a job finishes, is aborted, or is
/// dropped before it ever ran.
struct PendingGuard(Arc<watch::Sender<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[derive(Debug)]
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    slots: Arc<Semaphore>,
    pending: Arc<watch::Sender<usize>>,
    shutdown_tx: watch::Sender<Option<Duration>>,
    runner: Mutex<Option<JoinHandle<()>>>,
    backoff: Duration,
}

impl WorkerPool {
    /// Must be called inside a tokio runtime.
    pub fn new(max_workers: usize, queue_length: usize, backoff: Duration) -> Self {
        let (tx, rx) = mpsc::channel(queue_length.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let (pending, _) = watch::channel(0usize);

        let runner = tokio::spawn(run_jobs(rx, shutdown_rx));

        Self {
            tx,
            slots: Arc::new(Semaphore::new(max_workers.max(1))),
            pending: Arc::new(pending),
            shutdown_tx,
            runner: Mutex::new(Some(runner)),
            backoff,
        }
    }

    /// Action slots; hold a permit only while running an action.
    pub fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.slots)
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Queue a job, retrying with exponential backoff while the queue is
    /// full. Fails only once the pool is shut down.
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.pending.send_modify(|n| *n += 1);
        let guard = PendingGuard(Arc::clone(&self.pending));
        let mut job: Job = Box::pin(async move {
            let _guard = guard;
            job.await;
        });

        let mut delay = self.backoff;
        loop {
            match self.tx.try_send(job) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    warn!(delay_ms = delay.as_millis() as u64, "job queue full; backing off");
                    job = returned;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
                Err(TrySendError::Closed(_)) => {
                    return Err(TriggerError::Other(anyhow::anyhow!(
                        "worker pool is shut down"
                    )));
                }
            }
        }
    }

    /// Resolve once every submitted job has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting jobs, give queued and in-flight jobs `grace` to
    /// finish, then abort the rest. Action slots stay available until the
    /// grace period is over.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self.shutdown_tx.send(Some(grace));
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runner) = runner {
            if let Err(err) = runner.await {
                error!(error = %err, "worker pool runner failed");
            }
        }
        self.slots.close();
    }
}

async fn run_jobs(mut rx: mpsc::Receiver<Job>, mut shutdown_rx: watch::Receiver<Option<Duration>>) {
    let mut running = JoinSet::new();

    let grace = loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                let grace = match changed {
                    Ok(()) => *shutdown_rx.borrow(),
                    Err(_) => None,
                };
                break grace.unwrap_or_default();
            }

            job = rx.recv() => match job {
                Some(job) => {
                    running.spawn(job);
                }
                None => break Duration::ZERO,
            },

            Some(res) = running.join_next(), if !running.is_empty() => {
                log_join(res);
            }
        }
    };

    // Refuse new submissions; whatever is already queued gets the grace
    // period like the running jobs.
    rx.close();
    while let Ok(job) = rx.try_recv() {
        running.spawn(job);
    }

    let in_flight = running.len();
    if in_flight > 0 {
        info!(in_flight, grace_secs = grace.as_secs_f64(), "waiting for running jobs");
    }
    let drained = tokio::time::timeout(grace, async {
        while let Some(res) = running.join_next().await {
            log_join(res);
        }
    })
    .await;

    if drained.is_err() {
        warn!(remaining = running.len(), "grace period over; aborting jobs");
        running.abort_all();
        while running.join_next().await.is_some() {}
    }
    debug!("worker pool stopped");
}

fn log_join(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = res {
        if err.is_panic() {
            error!(error = %err, "trigger job panicked");
        }
    }
}
