//! In-memory job queue implementation
//!
//! Suitable for tests and single-instance deployments where a lost
//! auto-watch job on restart is acceptable.

use super::JobsConfig;
use crate::error::Result;
use crate::traits::job::{Job, JobData, JobQueue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default maximum size for completed/failed job history
const DEFAULT_MAX_HISTORY_SIZE: usize = 10_000;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<JobData>,
    processing: HashMap<String, JobData>,
    scheduled: BTreeMap<DateTime<Utc>, Vec<JobData>>,
    completed: VecDeque<JobData>,
    failed: VecDeque<JobData>,
}

impl QueueState {
    fn promote_due(&mut self, now: DateTime<Utc>) -> usize {
        let due: Vec<DateTime<Utc>> = self
            .scheduled
            .range(..=now)
            .map(|(time, _)| *time)
            .collect();

        let mut moved = 0;
        for key in due {
            if let Some(jobs) = self.scheduled.remove(&key) {
                moved += jobs.len();
                self.pending.extend(jobs);
            }
        }
        moved
    }
}

/// In-memory job queue
///
/// Failed jobs are retried with exponential backoff
/// (`retry_backoff_seconds * 2^retry_count`) until `max_retries` is reached,
/// then kept in a bounded failed history.
///
/// Scheduled jobs become available either when [`dequeue`](JobQueue::dequeue)
/// observes they are due or when the background promoter started by
/// [`InMemoryJobQueue::start_promoter`] moves them.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    max_retries: u32,
    retry_backoff_seconds: u64,
    max_history_size: usize,
    shutdown: Arc<AtomicBool>,
    promoter: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl InMemoryJobQueue {
    /// Create a new in-memory job queue
    pub fn new(max_retries: u32, retry_backoff_seconds: u64) -> Self {
        Self::with_history_limit(max_retries, retry_backoff_seconds, DEFAULT_MAX_HISTORY_SIZE)
    }

    /// Create a queue with the retry policy of `config`
    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff_seconds)
    }

    /// Create a new in-memory job queue with custom history limit
    pub fn with_history_limit(
        max_retries: u32,
        retry_backoff_seconds: u64,
        max_history_size: usize,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_retries,
            retry_backoff_seconds,
            max_history_size,
            shutdown: Arc::new(AtomicBool::new(false)),
            promoter: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn a task that moves due scheduled jobs to the pending queue once a second.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start_promoter(&self) {
        let mut guard = self.promoter.lock().await;
        if guard.is_some() {
            return;
        }

        let state = self.state.clone();
        let shutdown = self.shutdown.clone();
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                if shutdown.load(Ordering::Acquire) {
                    tracing::debug!("In-memory job queue promoter shutting down");
                    break;
                }
                let moved = state.lock().await.promote_due(Utc::now());
                if moved > 0 {
                    tracing::debug!(moved, "Promoted scheduled jobs");
                }
            }
        }));
    }

    /// Stop the background promoter, if running.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.promoter.lock().await.take() {
            match tokio::time::timeout(tokio::time::Duration::from_secs(5), handle).await {
                Ok(_) => tracing::debug!("In-memory job queue promoter stopped cleanly"),
                Err(_) => tracing::warn!("In-memory job queue promoter did not stop within timeout"),
            }
        }
    }

    /// Number of jobs waiting to be dequeued.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Number of jobs waiting for their scheduled time.
    pub async fn scheduled_len(&self) -> usize {
        self.state.lock().await.scheduled.values().map(Vec::len).sum()
    }

    /// Number of jobs that exhausted their retries.
    pub async fn failed_len(&self) -> usize {
        self.state.lock().await.failed.len()
    }

    /// Number of jobs that completed.
    pub async fn completed_len(&self) -> usize {
        self.state.lock().await.completed.len()
    }

    fn push_bounded(history: &mut VecDeque<JobData>, job: JobData, max_size: usize) {
        if history.len() >= max_size {
            history.pop_front();
        }
        history.push_back(job);
    }

    fn backoff_for(&self, retry_count: u32) -> Duration {
        let factor = 2_u64.saturating_pow(retry_count);
        let seconds = self.retry_backoff_seconds.saturating_mul(factor);
        Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &dyn Job) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let data = JobData::new(
            job_id.clone(),
            job.job_type().to_string(),
            job.serialize()?,
            self.max_retries,
        );

        self.state.lock().await.pending.push_back(data);
        Ok(job_id)
    }

    async fn dequeue(&self) -> Result<Option<JobData>> {
        let mut state = self.state.lock().await;
        state.promote_due(Utc::now());

        let Some(data) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.processing.insert(data.job_id.clone(), data.clone());
        Ok(Some(data))
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(data) = state.processing.remove(job_id) {
            Self::push_bounded(&mut state.completed, data, self.max_history_size);
        }
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: String) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut data) = state.processing.remove(job_id) else {
            return Ok(());
        };

        if data.should_retry() {
            let retry_at = Utc::now() + self.backoff_for(data.retry_count);
            data.increment_retry();
            data.scheduled_at = Some(retry_at);
            tracing::debug!(job_id, retry_count = data.retry_count, %retry_at, error = %error, "Job scheduled for retry");
            state.scheduled.entry(retry_at).or_default().push(data);
        } else {
            tracing::warn!(job_id, job_type = %data.job_type, error = %error, "Job exhausted its retries");
            Self::push_bounded(&mut state.failed, data, self.max_history_size);
        }

        Ok(())
    }

    async fn retry(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut data) = state.processing.remove(job_id) else {
            return Ok(());
        };

        if data.should_retry() {
            data.increment_retry();
            state.pending.push_back(data);
        } else {
            Self::push_bounded(&mut state.failed, data, self.max_history_size);
        }
        Ok(())
    }

    async fn schedule(&self, job: &dyn Job, run_at: DateTime<Utc>) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let data = JobData::scheduled(
            job_id.clone(),
            job.job_type().to_string(),
            job.serialize()?,
            self.max_retries,
            run_at,
        );

        self.state
            .lock()
            .await
            .scheduled
            .entry(run_at)
            .or_default()
            .push(data);
        Ok(job_id)
    }

    fn is_healthy(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(3, 60)
    }
}
