use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::job::JobId;
use crate::runner::JobRunner;

/// A queued request to run one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEnvelope {
    pub job_id: JobId,
}

/// Handle for submitting jobs to the worker pool.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobEnvelope>,
}

impl JobQueue {
    /// Enqueue a job run. Returns `false` when the pool has shut down.
    pub async fn submit(&self, job_id: JobId) -> bool {
        self.tx.send(JobEnvelope { job_id }).await.is_ok()
    }
}

/// A running pool of report workers sharing one queue.
///
/// Every envelope is processed by exactly one worker. A failed run is a
/// worker-level event, not a pool-level one: the error is recorded on
/// the job by the runner and logged here, and the worker moves on to the
/// next envelope.
pub struct WorkerPool {
    queue: JobQueue,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Spawn `worker_count` workers draining a bounded queue of `capacity`.
    pub fn spawn(runner: Arc<JobRunner>, worker_count: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<JobEnvelope>(capacity);
        let (shutdown, _) = watch::channel(false);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let runner = runner.clone();
                let rx = rx.clone();
                let mut stop = shutdown.subscribe();
                tokio::spawn(async move {
                    loop {
                        // Biased toward the queue: queued envelopes drain
                        // before the stop signal is observed.
                        let envelope = tokio::select! {
                            biased;
                            envelope = async { rx.lock().await.recv().await } => envelope,
                            _ = stop.changed() => None,
                        };
                        let Some(envelope) = envelope else {
                            info!(worker, "Report worker stopping");
                            break;
                        };
                        match runner.run(envelope.job_id).await {
                            Ok(job) => {
                                info!(worker, job = %job.id, "Report job completed");
                            }
                            Err(err) => {
                                // Surfaced, never swallowed: the job row
                                // carries the failed status, the log the cause.
                                error!(worker, job = %envelope.job_id, error = %err, "Report job failed");
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            queue: JobQueue { tx },
            shutdown,
            workers,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Stop accepting work and wait for in-flight runs to finish.
    pub async fn shutdown(self) {
        drop(self.queue);
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
