//! Gatehouse - team-scoped repository access control
//!
//! Gatehouse keeps a derived permission projection (which user can reach which
//! repository, at what level) consistent with the graph of organizations,
//! teams, team-repository links and team memberships. Every structural edit
//! runs in one transaction and updates the access projection, watch
//! subscriptions, issue assignments and branch-protection whitelists together.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gatehouse::teams::{
//!     InMemoryTeamStore, OpContext, TeamCreateParams, TeamManager, TeamMembershipManager,
//! };
//! use gatehouse::{AccessMode, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     gatehouse::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let store = InMemoryTeamStore::new();
//!     store.add_organization(1).await;
//!
//!     let teams = TeamManager::new(store.clone(), config.teams.clone());
//!     let members = TeamMembershipManager::new(store.clone(), config.teams.clone());
//!
//!     let ctx = OpContext::new();
//!     let team = teams
//!         .create_team(&ctx, TeamCreateParams::new(1, "backend").access_mode(AccessMode::Write))
//!         .await?;
//!     members.add_member(&ctx, team.id, 42).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod jobs;
pub mod teams;
pub mod traits;
pub mod utils;

pub use config::{Config, ConfigBuilder, LoggingConfig};
pub use error::{ErrorContext, ErrorWithContext, GatehouseError, Result};
pub use jobs::{InMemoryJobQueue, JobRegistry, JobWorker, JobsConfig, WorkerPool};
pub use teams::{AccessMode, TeamError, TeamsConfig};
pub use traits::job::{Job, JobData, JobQueue};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "gatehouse=debug")
/// - `GATEHOUSE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("GATEHOUSE_LOG_JSON")
        .ok()
        .and_then(|v| utils::parse_env_bool(&v))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
