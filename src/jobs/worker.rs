//! Job worker system for processing background jobs
//!
//! Workers poll the job queue and execute jobs using registered handlers.

use crate::error::Result;
use crate::jobs::registry::JobRegistry;
use crate::traits::job::JobQueue;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};

/// A single worker that processes jobs from a queue
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    registry: Arc<JobRegistry>,
    worker_id: String,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobWorker {
    /// Create a new job worker
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<JobRegistry>,
        worker_id: String,
    ) -> (Self, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            Self {
                queue,
                registry,
                worker_id,
                shutdown_tx,
            },
            shutdown_rx,
        )
    }

    /// Start the worker and process jobs until shutdown is requested.
    pub async fn start(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(worker_id = %self.worker_id, "Job worker started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(worker_id = %self.worker_id, "Shutdown signal received");
                    break;
                }
                result = self.process_next_job() => {
                    match result {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            tokio::select! {
                                _ = shutdown_rx.recv() => break,
                                _ = sleep(Duration::from_millis(100)) => {},
                            }
                        }
                        Err(e) => {
                            tracing::error!(worker_id = %self.worker_id, error = %e, "Error processing job");
                            tokio::select! {
                                _ = shutdown_rx.recv() => break,
                                _ = sleep(Duration::from_secs(1)) => {},
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Job worker stopped");
    }

    /// Process the next available job from the queue
    ///
    /// Returns the id of the processed job, or `None` when the queue is empty.
    /// A failing handler is reported to the queue, which owns the retry policy.
    pub async fn process_next_job(&self) -> Result<Option<String>> {
        let Some(job_data) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        let job_id = job_data.job_id.clone();
        tracing::debug!(
            worker_id = %self.worker_id,
            job_id = %job_id,
            job_type = %job_data.job_type,
            "Processing job"
        );

        match self.registry.execute(job_data).await {
            Ok(()) => {
                self.queue.complete(&job_id).await?;
                tracing::debug!(worker_id = %self.worker_id, job_id = %job_id, "Job completed");
            }
            Err(e) => {
                self.queue.fail(&job_id, e.to_string()).await?;
                tracing::warn!(
                    worker_id = %self.worker_id,
                    job_id = %job_id,
                    error = %e,
                    "Job failed"
                );
            }
        }

        Ok(Some(job_id))
    }

    /// Process jobs until the queue reports no ready job.
    ///
    /// Returns the number of jobs processed.
    pub async fn drain(&self) -> Result<usize> {
        let mut processed = 0;
        while self.process_next_job().await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Request shutdown of this worker
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Pool of workers that process jobs concurrently
pub struct WorkerPool {
    workers: Vec<tokio::task::JoinHandle<()>>,
    shutdown_txs: Vec<mpsc::Sender<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers sharing one queue and registry
    pub fn new(queue: Arc<dyn JobQueue>, registry: Arc<JobRegistry>, worker_count: usize) -> Self {
        let mut workers = Vec::with_capacity(worker_count);
        let mut shutdown_txs = Vec::with_capacity(worker_count);

        for i in 0..worker_count {
            let (worker, shutdown_rx) =
                JobWorker::new(queue.clone(), registry.clone(), format!("worker-{}", i));
            shutdown_txs.push(worker.shutdown_tx.clone());
            workers.push(tokio::spawn(async move {
                worker.start(shutdown_rx).await;
            }));
        }

        Self {
            workers,
            shutdown_txs,
        }
    }

    /// Number of workers in the pool
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Shutdown all workers, letting each finish its current job
    pub async fn shutdown(self) {
        tracing::info!("Shutting down worker pool...");

        for shutdown_tx in self.shutdown_txs {
            let _ = shutdown_tx.send(()).await;
        }
        for worker in self.workers {
            let _ = worker.await;
        }

        tracing::info!("Worker pool shut down");
    }
}
