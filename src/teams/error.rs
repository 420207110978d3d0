//! Team error types.

use super::types::{OrgId, RepoId, TeamId, UserId};
use thiserror::Error;

/// Errors that can occur during team operations.
#[derive(Debug, Error)]
pub enum TeamError {
    /// Team name is empty.
    #[error("Team name cannot be empty")]
    EmptyName,

    /// Team name contains unusable characters or is reserved.
    #[error("Invalid team name: {name}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Another team in the organization already uses this name.
    #[error("Team already exists in organization {org_id}: {name}")]
    TeamAlreadyExists {
        /// The organization.
        org_id: OrgId,
        /// The colliding name.
        name: String,
    },

    /// Removing the member would leave the owner team empty.
    #[error("User {user_id} is the last member of the owner team")]
    LastOwner {
        /// The user that cannot be removed.
        user_id: UserId,
    },

    /// The owner team cannot be renamed or given another access mode.
    #[error("Owner team {team_id} cannot be renamed or change its access mode")]
    OwnerTeamImmutable {
        /// The owner team.
        team_id: TeamId,
    },

    /// The team includes all repositories; detaching requires force.
    #[error("Team {team_id} includes all repositories; repository cannot be detached")]
    IncludesAllRepositories {
        /// The team.
        team_id: TeamId,
    },

    /// The repository is owned by a different organization.
    #[error("Repository {repo_id} does not belong to organization {org_id}")]
    RepositoryNotInOrganization {
        /// The repository.
        repo_id: RepoId,
        /// The team's organization.
        org_id: OrgId,
    },

    /// Organization not found.
    #[error("Organization not found: {org_id}")]
    OrganizationNotFound {
        /// The ID that was not found.
        org_id: OrgId,
    },

    /// Team not found.
    #[error("Team not found: {team_id}")]
    TeamNotFound {
        /// The ID that was not found.
        team_id: TeamId,
    },

    /// Repository not found.
    #[error("Repository not found: {repo_id}")]
    RepositoryNotFound {
        /// The ID that was not found.
        repo_id: RepoId,
    },

    /// The operation's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::error::GatehouseError),
}

impl TeamError {
    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Create a team already exists error.
    pub fn team_already_exists(org_id: OrgId, name: impl Into<String>) -> Self {
        Self::TeamAlreadyExists {
            org_id,
            name: name.into(),
        }
    }

    /// Whether the error was raised before any write, by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyName
                | Self::InvalidName { .. }
                | Self::TeamAlreadyExists { .. }
                | Self::OwnerTeamImmutable { .. }
        )
    }

    /// Whether the error reports a missing organization, team or repository.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::OrganizationNotFound { .. }
                | Self::TeamNotFound { .. }
                | Self::RepositoryNotFound { .. }
                | Self::Storage(crate::error::GatehouseError::NotFound(_))
        )
    }
}

/// Result type for team operations.
pub type Result<T> = std::result::Result<T, TeamError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatehouseError;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TeamError::team_already_exists(3, "Devs").to_string(),
            "Team already exists in organization 3: Devs"
        );
        assert_eq!(
            TeamError::LastOwner { user_id: 9 }.to_string(),
            "User 9 is the last member of the owner team"
        );
    }

    #[test]
    fn test_classification() {
        assert!(TeamError::EmptyName.is_validation());
        assert!(!TeamError::Cancelled.is_validation());
        assert!(TeamError::TeamNotFound { team_id: 1 }.is_not_found());

        let storage: TeamError = GatehouseError::not_found("repository 4").into();
        assert!(storage.is_not_found());
    }
}
