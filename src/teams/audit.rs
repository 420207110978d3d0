//! Team audit logging.
//!
//! Entries are recorded after the operation's transaction commits.

use super::types::{OrgId, TeamId, UserId};
use serde::{Deserialize, Serialize};

/// Audit entry for team operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAuditEntry {
    /// Unique identifier for this audit entry.
    pub id: String,
    /// The type of event.
    pub event: TeamAuditEvent,
    /// Organization the team belongs to.
    pub org_id: OrgId,
    /// Team this event relates to.
    pub team_id: TeamId,
    /// User who performed the action, when known.
    pub actor_id: Option<UserId>,
    /// Target user or repository ID.
    pub target_id: Option<i64>,
    /// Additional details about the event.
    pub details: Option<String>,
    /// Timestamp (Unix seconds).
    pub timestamp: u64,
}

/// Team audit event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamAuditEvent {
    TeamCreated,
    TeamUpdated,
    TeamDeleted,
    RepositoryAttached,
    RepositoryDetached,
    MemberAdded,
    MemberRemoved,
}

impl std::fmt::Display for TeamAuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TeamCreated => write!(f, "team_created"),
            Self::TeamUpdated => write!(f, "team_updated"),
            Self::TeamDeleted => write!(f, "team_deleted"),
            Self::RepositoryAttached => write!(f, "repository_attached"),
            Self::RepositoryDetached => write!(f, "repository_detached"),
            Self::MemberAdded => write!(f, "member_added"),
            Self::MemberRemoved => write!(f, "member_removed"),
        }
    }
}

impl TeamAuditEntry {
    /// Create a new audit entry for a team event.
    #[must_use]
    pub fn new(
        event: TeamAuditEvent,
        org_id: OrgId,
        team_id: TeamId,
        actor_id: Option<UserId>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event,
            org_id,
            team_id,
            actor_id,
            target_id: None,
            details: None,
            timestamp: super::utils::current_timestamp(),
        }
    }

    /// Set the target user or repository ID.
    #[must_use]
    pub fn with_target(mut self, target_id: i64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Set additional details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
