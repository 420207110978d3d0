//! Team configuration.

use crate::utils::{get_env_with_prefix, parse_env_bool};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for team and membership management.
///
/// # Example
///
/// ```rust
/// use gatehouse::teams::TeamsConfig;
///
/// let config = TeamsConfig::new()
///     .auto_watch_new_repos(false)
///     .access_batch_size(50)
///     .operation_timeout_seconds(Some(30));
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TeamsConfig {
    /// Watch a repository for team members when it is attached, and watch
    /// all team repositories for a newly added member.
    #[serde(default = "default_auto_watch")]
    pub auto_watch_new_repos: bool,

    /// Maximum number of access rows written per insert batch.
    #[serde(default = "default_access_batch_size")]
    pub access_batch_size: usize,

    /// Team descriptions are truncated to this many characters.
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,

    /// Deadline applied to operations whose context carries none.
    #[serde(default)]
    pub operation_timeout_seconds: Option<u64>,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            auto_watch_new_repos: default_auto_watch(),
            access_batch_size: default_access_batch_size(),
            max_description_length: default_max_description_length(),
            operation_timeout_seconds: None,
        }
    }
}

impl TeamsConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether members auto-watch team repositories.
    #[must_use]
    pub fn auto_watch_new_repos(mut self, enabled: bool) -> Self {
        self.auto_watch_new_repos = enabled;
        self
    }

    /// Set the access insert batch size.
    #[must_use]
    pub fn access_batch_size(mut self, size: usize) -> Self {
        self.access_batch_size = size;
        self
    }

    /// Set the maximum description length.
    #[must_use]
    pub fn max_description_length(mut self, max: usize) -> Self {
        self.max_description_length = max;
        self
    }

    /// Set the default operation timeout.
    #[must_use]
    pub fn operation_timeout_seconds(mut self, seconds: Option<u64>) -> Self {
        self.operation_timeout_seconds = seconds;
        self
    }

    /// Default operation timeout as a duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_seconds.map(Duration::from_secs)
    }

    /// Load team configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) =
            get_env_with_prefix("AUTO_WATCH_NEW_REPOS").and_then(|v| parse_env_bool(&v))
        {
            config.auto_watch_new_repos = enabled;
        }

        if let Some(size) = get_env_with_prefix("ACCESS_BATCH_SIZE") {
            if let Ok(s) = size.parse() {
                config.access_batch_size = s;
            }
        }

        if let Some(max) = get_env_with_prefix("TEAM_DESCRIPTION_MAX_LENGTH") {
            if let Ok(m) = max.parse() {
                config.max_description_length = m;
            }
        }

        if let Some(timeout) = get_env_with_prefix("TEAM_OPERATION_TIMEOUT_SECONDS") {
            if let Ok(t) = timeout.parse() {
                config.operation_timeout_seconds = Some(t);
            }
        }

        config
    }
}

fn default_auto_watch() -> bool {
    true
}

fn default_access_batch_size() -> usize {
    100
}

fn default_max_description_length() -> usize {
    255
}
