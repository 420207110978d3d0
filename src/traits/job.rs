//! Background job system traits
//!
//! Jobs carry work that must happen outside a team transaction, such as
//! subscribing a freshly added member to the team's repositories.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A background job that can be enqueued.
///
/// Execution is owned by the handler registered for [`Job::job_type`] in a
/// [`JobRegistry`](crate::jobs::JobRegistry); the job itself only describes
/// its payload.
pub trait Job: Send + Sync + Debug {
    /// Unique identifier for this job type (e.g., "auto_watch")
    fn job_type(&self) -> &str;

    /// Serialize the job payload to JSON
    fn serialize(&self) -> Result<serde_json::Value>;
}

/// Job data structure for queue storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    /// Unique job identifier
    pub job_id: String,
    /// Job type identifier (matches `Job::job_type()`)
    pub job_type: String,
    /// Serialized job payload (JSON)
    pub payload: serde_json::Value,
    /// Current retry attempt count
    pub retry_count: u32,
    /// Maximum number of retries allowed
    pub max_retries: u32,
    /// When this job should be executed (None = immediate)
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Timestamp when job was created
    pub created_at: DateTime<Utc>,
}

impl JobData {
    /// Create a new JobData instance
    pub fn new(job_id: String, job_type: String, payload: serde_json::Value, max_retries: u32) -> Self {
        Self {
            job_id,
            job_type,
            payload,
            retry_count: 0,
            max_retries,
            scheduled_at: None,
            created_at: Utc::now(),
        }
    }

    /// Create a scheduled JobData instance
    pub fn scheduled(
        job_id: String,
        job_type: String,
        payload: serde_json::Value,
        max_retries: u32,
        run_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scheduled_at: Some(run_at),
            ..Self::new(job_id, job_type, payload, max_retries)
        }
    }

    /// Check if this job should be retried
    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Increment retry count and return new count
    pub fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }
}

/// Job queue trait for enqueueing and processing background jobs
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for immediate execution
    ///
    /// Returns the job ID that can be used to track the job.
    async fn enqueue(&self, job: &dyn Job) -> Result<String>;

    /// Dequeue the next available job, moving it to the processing state
    async fn dequeue(&self) -> Result<Option<JobData>>;

    /// Mark a job as completed
    async fn complete(&self, job_id: &str) -> Result<()>;

    /// Mark a job as failed
    ///
    /// The queue decides whether the job is retried with backoff or moved to
    /// the failed history.
    async fn fail(&self, job_id: &str, error: String) -> Result<()>;

    /// Re-enqueue a processing job immediately with an incremented retry count
    async fn retry(&self, job_id: &str) -> Result<()>;

    /// Schedule a job for future execution
    async fn schedule(&self, job: &dyn Job, run_at: DateTime<Utc>) -> Result<String>;

    /// Check if the queue is healthy and operational
    fn is_healthy(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget() {
        let mut data = JobData::new(
            "job-1".to_string(),
            "auto_watch".to_string(),
            serde_json::json!({}),
            2,
        );
        assert!(data.should_retry());
        assert_eq!(data.increment_retry(), 1);
        assert!(data.should_retry());
        assert_eq!(data.increment_retry(), 2);
        assert!(!data.should_retry());
    }

    #[test]
    fn test_scheduled_job_keeps_run_at() {
        let run_at = Utc::now();
        let data = JobData::scheduled(
            "job-2".to_string(),
            "auto_watch".to_string(),
            serde_json::json!({"user_id": 1}),
            3,
            run_at,
        );
        assert_eq!(data.scheduled_at, Some(run_at));
        assert_eq!(data.retry_count, 0);
    }
}
