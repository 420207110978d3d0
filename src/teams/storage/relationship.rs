//! Team, team-repository and team-user edges.

use crate::error::Result;
use crate::teams::types::{OrgId, RepoId, Team, TeamId, TeamRepo, TeamUnit, TeamUser, UserId};
use async_trait::async_trait;

/// Persisted team graph.
///
/// Inserting a TeamRepo or TeamUser edge that already exists fails with
/// [`GatehouseError::Conflict`](crate::GatehouseError::Conflict).
#[async_trait]
pub trait RelationshipStore: Send {
    // === Teams ===

    /// Get a team with its units.
    async fn get_team(&mut self, team_id: TeamId) -> Result<Option<Team>>;

    /// Find a team by its lower-cased name within an organization.
    async fn find_team_by_lower_name(
        &mut self,
        org_id: OrgId,
        lower_name: &str,
    ) -> Result<Option<Team>>;

    /// Insert a team and return its new ID.
    ///
    /// `team.id` and `team.units` are ignored; counters are stored as given.
    async fn insert_team(&mut self, team: &Team) -> Result<TeamId>;

    /// Update name, description, access mode and flags. Counters are untouched.
    async fn update_team(&mut self, team: &Team) -> Result<()>;

    async fn delete_team(&mut self, team_id: TeamId) -> Result<()>;

    /// Replace every unit of the team.
    async fn replace_units(&mut self, team_id: TeamId, units: &[TeamUnit]) -> Result<()>;

    async fn delete_units(&mut self, team_id: TeamId) -> Result<()>;

    /// Atomically add `delta` to the team's repository counter.
    async fn adjust_num_repos(&mut self, team_id: TeamId, delta: i64) -> Result<()>;

    /// Atomically add `delta` to the team's member counter.
    async fn adjust_num_members(&mut self, team_id: TeamId, delta: i64) -> Result<()>;

    // === TeamRepo ===

    async fn has_team_repo(&mut self, team_id: TeamId, repo_id: RepoId) -> Result<bool>;

    async fn insert_team_repo(&mut self, edge: &TeamRepo) -> Result<()>;

    /// Returns whether an edge was removed.
    async fn delete_team_repo(&mut self, team_id: TeamId, repo_id: RepoId) -> Result<bool>;

    /// Returns the number of edges removed.
    async fn delete_team_repos(&mut self, team_id: TeamId) -> Result<u64>;

    async fn list_team_repo_ids(&mut self, team_id: TeamId) -> Result<Vec<RepoId>>;

    /// Teams holding an edge to the repository.
    async fn list_teams_for_repo(&mut self, repo_id: RepoId) -> Result<Vec<Team>>;

    // === TeamUser ===

    async fn is_team_member(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool>;

    async fn insert_team_user(&mut self, edge: &TeamUser) -> Result<()>;

    /// Returns whether an edge was removed.
    async fn delete_team_user(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool>;

    /// Returns the number of edges removed.
    async fn delete_team_users(&mut self, team_id: TeamId) -> Result<u64>;

    async fn list_team_member_ids(&mut self, team_id: TeamId) -> Result<Vec<UserId>>;

    /// Number of teams in the organization the user belongs to.
    async fn count_user_teams_in_org(&mut self, org_id: OrgId, user_id: UserId) -> Result<u64>;
}
