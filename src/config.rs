use serde::{Deserialize, Serialize};

use crate::jobs::JobsConfig;
use crate::teams::TeamsConfig;
use crate::utils::{get_env_with_prefix, parse_env_bool};

/// Main configuration for a gatehouse deployment
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_teams_config(mut self, teams: TeamsConfig) -> Self {
        self.config.teams = teams;
        self
    }

    /// Toggle auto-watching of team repositories for new members and new links
    pub fn with_auto_watch(mut self, enabled: bool) -> Self {
        self.config.teams.auto_watch_new_repos = enabled;
        self
    }

    pub fn with_jobs_config(mut self, jobs: JobsConfig) -> Self {
        self.config.jobs = jobs;
        self
    }

    /// Load configuration from environment variables with GATEHOUSE_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON").and_then(|v| parse_env_bool(&v)) {
            self.config.logging.json = json;
        }

        self.config.teams = TeamsConfig::from_env();
        self.config.jobs = JobsConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid log level
    /// - Zero access batch size or description limit
    /// - Zero operation timeout
    /// - Job workers enabled with a worker count of zero
    pub fn build(self) -> crate::error::Result<Config> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(crate::error::GatehouseError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.teams.access_batch_size == 0 {
            return Err(crate::error::GatehouseError::bad_request(
                "Access batch size must be greater than 0",
            ));
        }

        if self.config.teams.max_description_length == 0 {
            return Err(crate::error::GatehouseError::bad_request(
                "Maximum team description length must be greater than 0",
            ));
        }

        if self.config.teams.operation_timeout_seconds == Some(0) {
            return Err(crate::error::GatehouseError::bad_request(
                "Operation timeout must be greater than 0 when set",
            ));
        }

        if self.config.jobs.enabled && self.config.jobs.worker_count == 0 {
            return Err(crate::error::GatehouseError::bad_request(
                "Job worker count must be greater than 0 when jobs are enabled",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.teams.auto_watch_new_repos);
        assert_eq!(config.teams.access_batch_size, 100);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = ConfigBuilder::new().with_log_level("loud").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = ConfigBuilder::new()
            .with_teams_config(TeamsConfig::new().access_batch_size(0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_auto_watch_toggle() {
        let config = ConfigBuilder::new().with_auto_watch(false).build().unwrap();
        assert!(!config.teams.auto_watch_new_repos);
    }

    #[test]
    fn test_workers_enabled_without_workers_rejected() {
        let jobs = JobsConfig {
            enabled: true,
            worker_count: 0,
            ..JobsConfig::default()
        };
        assert!(ConfigBuilder::new().with_jobs_config(jobs).build().is_err());
    }
}
