//! Configuration for background job system

use crate::utils::{get_env_with_prefix, parse_env_bool};
use serde::{Deserialize, Serialize};

/// Configuration for background jobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Spawn a worker pool for queued jobs
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of workers to spawn
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Maximum number of retries for failed jobs
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry backoff in seconds (exponential backoff: base * 2^retry_count)
    #[serde(default = "default_retry_backoff_seconds")]
    pub retry_backoff_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            retry_backoff_seconds: default_retry_backoff_seconds(),
        }
    }
}

impl JobsConfig {
    /// Load jobs configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("JOBS_ENABLED").and_then(|v| parse_env_bool(&v)) {
            config.enabled = enabled;
        }

        if let Some(count) = get_env_with_prefix("JOBS_WORKER_COUNT") {
            if let Ok(c) = count.parse() {
                config.worker_count = c;
            }
        }

        if let Some(retries) = get_env_with_prefix("JOBS_MAX_RETRIES") {
            if let Ok(r) = retries.parse() {
                config.max_retries = r;
            }
        }

        if let Some(backoff) = get_env_with_prefix("JOBS_RETRY_BACKOFF_SECONDS") {
            if let Ok(b) = backoff.parse() {
                config.retry_backoff_seconds = b;
            }
        }

        config
    }
}

fn default_enabled() -> bool {
    true
}

fn default_worker_count() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_seconds() -> u64 {
    30
}
