//! Job registry for mapping job types to handler functions

use crate::error::{GatehouseError, Result};
use crate::traits::job::JobData;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Handlers receive the `JobData` and deserialize the payload themselves.
/// Anything else they need (a transaction runner, configuration) is captured
/// when the handler is registered.
type JobHandler = Arc<dyn Fn(JobData) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Registry for mapping job types to their handlers
///
/// Thread-safe and shared across workers.
#[derive(Clone)]
pub struct JobRegistry {
    handlers: Arc<tokio::sync::RwLock<HashMap<String, JobHandler>>>,
}

impl JobRegistry {
    /// Create a new empty job registry
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
        }
    }

    /// Register a job type with its handler function
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// registry.register("auto_watch", move |data| {
    ///     let runner = runner.clone();
    ///     Box::pin(async move {
    ///         let job: AutoWatchJob = serde_json::from_value(data.payload)?;
    ///         job.run(&runner).await.map(|_| ())
    ///     })
    /// }).await;
    /// ```
    pub async fn register<F>(&self, job_type: &str, handler: F)
    where
        F: Fn(JobData) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let handler: JobHandler = Arc::new(handler);
        self.handlers
            .write()
            .await
            .insert(job_type.to_string(), handler);
    }

    /// Execute a job by looking up its handler
    ///
    /// Returns an error if the job type is not registered.
    pub async fn execute(&self, data: JobData) -> Result<()> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&data.job_type).cloned().ok_or_else(|| {
                GatehouseError::internal(format!(
                    "No handler registered for job type: {}",
                    data.job_type
                ))
            })?
        };

        handler(data).await
    }

    /// Check if a job type is registered
    pub async fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.read().await.contains_key(job_type)
    }

    /// Get all registered job types
    pub async fn registered_types(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
