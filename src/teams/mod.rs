//! Team-scoped repository access control.
//!
//! This module keeps the access projection consistent with the team graph:
//! - **Relationship store** - trait-based storage of teams, links and memberships
//! - **Access maintainer** - recomputes access rows as the maximum over grant paths
//! - **Cascade reconciler** - drops watches and assignments after access is lost
//! - **Managers** - team lifecycle and membership operations, one transaction each
//!
//! # Example
//!
//! ```rust,ignore
//! use gatehouse::teams::{
//!     InMemoryTeamStore, OpContext, TeamCreateParams, TeamManager, TeamMembershipManager,
//!     TeamsConfig,
//! };
//!
//! let store = InMemoryTeamStore::new();
//! let teams = TeamManager::new(store.clone(), TeamsConfig::default());
//! let members = TeamMembershipManager::new(store.clone(), TeamsConfig::default());
//!
//! let ctx = OpContext::new();
//! let team = teams.create_team(&ctx, TeamCreateParams::new(org_id, "backend")).await?;
//! teams.attach_repository(&ctx, team.id, repo_id).await?;
//! members.add_member(&ctx, team.id, user_id).await?;
//! ```

pub mod access;
mod audit;
mod config;
mod context;
mod error;
mod manager;
mod membership_manager;
mod memory;
pub mod reconcile;
mod repo_link;
pub mod storage;
mod types;
mod utils;
mod watch_dispatch;

#[cfg(feature = "database")]
mod sea_orm_store;

// Configuration exports
pub use config::TeamsConfig;

// Context exports
pub use context::OpContext;

// Error exports
pub use error::TeamError;

// Audit exports
pub use audit::{TeamAuditEntry, TeamAuditEvent};

// Manager exports
pub use manager::TeamManager;
pub use membership_manager::TeamMembershipManager;

// Projection exports
pub use access::{AccessChanges, AccessMaintainer, compute_repo_accesses};
pub use reconcile::{reconcile_lost_access, remove_id_from_list, scrub_branch_protections};

// Storage trait exports
pub use storage::{
    AccessChecker, AccessStore, BranchProtectionStore, IssueAssignmentService,
    OptionalAuditStore, OrgMembershipService, OrganizationStore, RelationshipStore,
    RepositoryStore, TeamAuditStore, TeamTransaction, TransactionRunner, WatchService,
    WithAuditStore,
};

// Type exports
pub use types::{
    Access, AccessMode, Collaboration, DetachMode, IssueId, LinkOutcome, MembershipOutcome,
    OWNER_TEAM_NAME, OrgId, ParseTeamTypeError, ProtectedBranch, RepoId, Repository, Team,
    TeamCreateParams, TeamId, TeamRepo, TeamUnit, TeamUpdateParams, TeamUser, UnitType, UserId,
};

// Auto-watch exports
pub use watch_dispatch::{
    AUTO_WATCH_JOB_TYPE, AutoWatchJob, NoopWatchDispatcher, QueuedWatchDispatcher,
    WatchDispatcher, register_auto_watch_handler, start_auto_watch_workers,
};

// In-memory store exports
pub use memory::{FailPoint, InMemoryAuditStore, InMemoryTeamStore, InMemoryTransaction, IssueRecord, MemoryState};

#[cfg(feature = "database")]
pub use sea_orm_store::{SeaOrmTeamStore, SeaOrmTransaction};
