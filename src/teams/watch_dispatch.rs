//! Post-commit auto-watch for newly added team members.
//!
//! The repository IDs are captured inside the add-member transaction and the
//! job is handed over only after that transaction commits. The handler runs
//! in its own transaction and never re-reads team state.

use super::storage::{TeamTransaction, TransactionRunner, WatchService};
use super::types::{RepoId, UserId};
use crate::error::Result;
use crate::jobs::{JobRegistry, JobsConfig, WorkerPool};
use crate::traits::job::{Job, JobData, JobQueue};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Job type under which [`AutoWatchJob`] is enqueued.
pub const AUTO_WATCH_JOB_TYPE: &str = "auto_watch";

/// Subscribe a user to a fixed set of repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoWatchJob {
    pub user_id: UserId,
    pub repo_ids: Vec<RepoId>,
}

impl Job for AutoWatchJob {
    fn job_type(&self) -> &str {
        AUTO_WATCH_JOB_TYPE
    }

    fn serialize(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl AutoWatchJob {
    /// Watch every repository in one transaction.
    ///
    /// A repository that fails to watch is logged and skipped. Returns the
    /// number of repositories watched.
    pub async fn run<R: TransactionRunner>(&self, runner: &R) -> Result<usize> {
        let mut tx = runner.begin().await?;
        let mut watched = 0;
        for &repo_id in &self.repo_ids {
            match tx.try_watch(self.user_id, repo_id).await {
                Ok(()) => watched += 1,
                Err(e) => warn!(
                    user_id = self.user_id,
                    repo_id,
                    error = %e,
                    "Failed to auto-watch repository"
                ),
            }
        }
        tx.commit().await?;

        debug!(user_id = self.user_id, watched, "Auto-watch job finished");
        Ok(watched)
    }
}

/// Hands auto-watch work to whatever executes it.
#[async_trait]
pub trait WatchDispatcher: Send + Sync {
    async fn dispatch(&self, job: AutoWatchJob) -> Result<()>;
}

/// Dispatcher that drops every job.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWatchDispatcher;

#[async_trait]
impl WatchDispatcher for NoopWatchDispatcher {
    async fn dispatch(&self, job: AutoWatchJob) -> Result<()> {
        debug!(user_id = job.user_id, "Auto-watch dispatch disabled; dropping job");
        Ok(())
    }
}

/// Dispatcher that enqueues jobs on a [`JobQueue`].
#[derive(Clone)]
pub struct QueuedWatchDispatcher {
    queue: Arc<dyn JobQueue>,
}

impl QueuedWatchDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl WatchDispatcher for QueuedWatchDispatcher {
    async fn dispatch(&self, job: AutoWatchJob) -> Result<()> {
        let job_id = self.queue.enqueue(&job).await?;
        debug!(job_id = %job_id, user_id = job.user_id, repos = job.repo_ids.len(), "Auto-watch job enqueued");
        Ok(())
    }
}

/// Register the [`AutoWatchJob`] handler, running each job against `runner`.
pub async fn register_auto_watch_handler<R>(registry: &JobRegistry, runner: R)
where
    R: TransactionRunner + Clone + 'static,
{
    registry
        .register(
            AUTO_WATCH_JOB_TYPE,
            move |data: JobData| -> BoxFuture<'static, Result<()>> {
                let runner = runner.clone();
                Box::pin(async move {
                    let job: AutoWatchJob = serde_json::from_value(data.payload)?;
                    job.run(&runner).await.map(|_| ())
                })
            },
        )
        .await;
}

/// Start the workers that execute auto-watch jobs from `queue`.
///
/// Returns `None` when jobs are disabled; queued jobs then wait for a later
/// worker.
pub async fn start_auto_watch_workers<R>(
    config: &JobsConfig,
    queue: Arc<dyn JobQueue>,
    runner: R,
) -> Option<WorkerPool>
where
    R: TransactionRunner + Clone + 'static,
{
    if !config.enabled {
        info!("Background jobs disabled; auto-watch workers not started");
        return None;
    }

    let registry = JobRegistry::new();
    register_auto_watch_handler(&registry, runner).await;
    let pool = WorkerPool::new(queue, Arc::new(registry), config.worker_count);
    info!(worker_count = config.worker_count, "Auto-watch workers started");
    Some(pool)
}
