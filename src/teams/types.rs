//! Domain types for teams, repositories and the access projection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Organization identifier.
pub type OrgId = i64;
/// Team identifier.
pub type TeamId = i64;
/// Repository identifier.
pub type RepoId = i64;
/// User identifier.
pub type UserId = i64;
/// Issue identifier.
pub type IssueId = i64;

/// Lower-cased name of the organization's owner team.
pub const OWNER_TEAM_NAME: &str = "owners";

/// Ordinal permission level.
///
/// Ordering follows privilege: `None < Read < Write < Admin < Owner`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AccessMode {
    #[default]
    None = 0,
    Read = 1,
    Write = 2,
    Admin = 3,
    Owner = 4,
}

impl AccessMode {
    /// Stable string form used in logs and audit details.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Numeric level, as persisted.
    pub fn level(self) -> i16 {
        self as i16
    }

    /// Inverse of [`level`](Self::level). Out-of-range values clamp to the nearest mode.
    pub fn from_level(level: i16) -> Self {
        match level {
            i16::MIN..=0 => Self::None,
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::Admin,
            _ => Self::Owner,
        }
    }

    /// Whether this mode grants at least read access.
    pub fn is_granted(self) -> bool {
        self >= Self::Read
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown access mode or unit name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseTeamTypeError {
    kind: &'static str,
    value: String,
}

impl FromStr for AccessMode {
    type Err = ParseTeamTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(ParseTeamTypeError {
                kind: "access mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Repository feature a team can be granted per-unit access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Code,
    Issues,
    PullRequests,
    Releases,
    Wiki,
    ExternalWiki,
    ExternalTracker,
    Projects,
    Packages,
}

impl UnitType {
    pub const ALL: [UnitType; 9] = [
        Self::Code,
        Self::Issues,
        Self::PullRequests,
        Self::Releases,
        Self::Wiki,
        Self::ExternalWiki,
        Self::ExternalTracker,
        Self::Projects,
        Self::Packages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Issues => "issues",
            Self::PullRequests => "pull_requests",
            Self::Releases => "releases",
            Self::Wiki => "wiki",
            Self::ExternalWiki => "external_wiki",
            Self::ExternalTracker => "external_tracker",
            Self::Projects => "projects",
            Self::Packages => "packages",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitType {
    type Err = ParseTeamTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str() == lowered)
            .ok_or(ParseTeamTypeError {
                kind: "unit type",
                value: lowered,
            })
    }
}

/// Per-feature access override held by a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamUnit {
    pub org_id: OrgId,
    pub team_id: TeamId,
    pub unit_type: UnitType,
    pub access_mode: AccessMode,
}

/// A team within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub org_id: OrgId,
    pub name: String,
    pub lower_name: String,
    pub description: String,
    pub access_mode: AccessMode,
    pub can_create_org_repo: bool,
    pub includes_all_repositories: bool,
    pub num_repos: i64,
    pub num_members: i64,
    pub units: Vec<TeamUnit>,
}

impl Team {
    /// Whether this is the organization's owner team.
    pub fn is_owner_team(&self) -> bool {
        self.lower_name == OWNER_TEAM_NAME
    }

    /// Mode the team grants on each attached repository.
    ///
    /// The owner team always grants `Owner`, whatever is stored.
    pub fn effective_mode(&self) -> AccessMode {
        if self.is_owner_team() {
            AccessMode::Owner
        } else {
            self.access_mode
        }
    }

    /// Access mode for a single unit, falling back to the team mode.
    pub fn unit_access_mode(&self, unit_type: UnitType) -> AccessMode {
        if self.is_owner_team() {
            return AccessMode::Owner;
        }
        self.units
            .iter()
            .find(|unit| unit.unit_type == unit_type)
            .map_or(self.access_mode, |unit| unit.access_mode)
    }
}

/// Parameters for creating a team.
#[derive(Debug, Clone)]
pub struct TeamCreateParams {
    pub org_id: OrgId,
    pub name: String,
    pub description: String,
    pub access_mode: AccessMode,
    pub can_create_org_repo: bool,
    pub includes_all_repositories: bool,
    pub units: Vec<(UnitType, AccessMode)>,
}

impl TeamCreateParams {
    /// A read-only team with no units.
    #[must_use]
    pub fn new(org_id: OrgId, name: impl Into<String>) -> Self {
        Self {
            org_id,
            name: name.into(),
            description: String::new(),
            access_mode: AccessMode::Read,
            can_create_org_repo: false,
            includes_all_repositories: false,
            units: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    #[must_use]
    pub fn can_create_org_repo(mut self, allowed: bool) -> Self {
        self.can_create_org_repo = allowed;
        self
    }

    #[must_use]
    pub fn includes_all_repositories(mut self, includes_all: bool) -> Self {
        self.includes_all_repositories = includes_all;
        self
    }

    #[must_use]
    pub fn unit(mut self, unit_type: UnitType, mode: AccessMode) -> Self {
        self.units.push((unit_type, mode));
        self
    }
}

/// Desired state of a team's mutable columns.
///
/// Build it from the stored team with [`TeamUpdateParams::from_team`] and
/// change what needs changing.
#[derive(Debug, Clone)]
pub struct TeamUpdateParams {
    pub team_id: TeamId,
    pub name: String,
    pub description: String,
    pub access_mode: AccessMode,
    pub can_create_org_repo: bool,
    pub includes_all_repositories: bool,
    /// Replaces the team's units when non-empty.
    pub units: Vec<(UnitType, AccessMode)>,
}

impl TeamUpdateParams {
    #[must_use]
    pub fn from_team(team: &Team) -> Self {
        Self {
            team_id: team.id,
            name: team.name.clone(),
            description: team.description.clone(),
            access_mode: team.access_mode,
            can_create_org_repo: team.can_create_org_repo,
            includes_all_repositories: team.includes_all_repositories,
            units: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    #[must_use]
    pub fn can_create_org_repo(mut self, allowed: bool) -> Self {
        self.can_create_org_repo = allowed;
        self
    }

    #[must_use]
    pub fn includes_all_repositories(mut self, includes_all: bool) -> Self {
        self.includes_all_repositories = includes_all;
        self
    }

    #[must_use]
    pub fn unit(mut self, unit_type: UnitType, mode: AccessMode) -> Self {
        self.units.push((unit_type, mode));
        self
    }
}

/// Team ↔ repository edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamRepo {
    pub org_id: OrgId,
    pub team_id: TeamId,
    pub repo_id: RepoId,
}

/// Team ↔ user edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamUser {
    pub org_id: OrgId,
    pub team_id: TeamId,
    pub user_id: UserId,
}

/// Row of the access projection. Never stored with [`AccessMode::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    pub user_id: UserId,
    pub repo_id: RepoId,
    pub mode: AccessMode,
}

/// Direct collaborator grant on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collaboration {
    pub repo_id: RepoId,
    pub user_id: UserId,
    pub mode: AccessMode,
}

/// The slice of a repository this crate needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    pub owner_id: OrgId,
    pub name: String,
    pub is_private: bool,
}

impl Repository {
    pub fn new(id: RepoId, owner_id: OrgId, name: impl Into<String>, is_private: bool) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            is_private,
        }
    }
}

/// Branch protection rule with team whitelists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranch {
    pub id: i64,
    pub repo_id: RepoId,
    pub branch_name: String,
    pub push_whitelist_team_ids: Vec<TeamId>,
    pub merge_whitelist_team_ids: Vec<TeamId>,
    pub approvals_whitelist_team_ids: Vec<TeamId>,
}

/// Result of a membership call. Every variant is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipOutcome {
    Added,
    AlreadyMember,
    Removed,
    NotMember,
}

/// Result of attaching or detaching a single repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    Attached,
    AlreadyAttached,
    Detached,
    NotAttached,
}

impl LinkOutcome {
    /// Whether the call changed a team-repository edge.
    pub fn changed(self) -> bool {
        matches!(self, Self::Attached | Self::Detached)
    }
}

/// How a single-repository detach behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachMode {
    /// Detach even when the team includes all repositories.
    pub force: bool,
    /// Recompute the repository's access projection.
    ///
    /// Skipped when the repository itself is being deleted.
    pub recalculate: bool,
}

impl DetachMode {
    /// Regular detach requested by a user.
    pub const fn new() -> Self {
        Self {
            force: false,
            recalculate: true,
        }
    }

    /// Detach used while deleting the repository.
    pub const fn repository_deleted() -> Self {
        Self {
            force: true,
            recalculate: false,
        }
    }

    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub const fn recalculate(mut self, recalculate: bool) -> Self {
        self.recalculate = recalculate;
        self
    }
}

impl Default for DetachMode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str, mode: AccessMode) -> Team {
        Team {
            id: 1,
            org_id: 1,
            name: name.to_string(),
            lower_name: name.to_lowercase(),
            description: String::new(),
            access_mode: mode,
            can_create_org_repo: false,
            includes_all_repositories: false,
            num_repos: 0,
            num_members: 0,
            units: vec![TeamUnit {
                org_id: 1,
                team_id: 1,
                unit_type: UnitType::Wiki,
                access_mode: AccessMode::Read,
            }],
        }
    }

    #[test]
    fn test_access_mode_ordering() {
        assert!(AccessMode::None < AccessMode::Read);
        assert!(AccessMode::Read < AccessMode::Write);
        assert!(AccessMode::Admin < AccessMode::Owner);
        assert_eq!(AccessMode::Read.max(AccessMode::Admin), AccessMode::Admin);
    }

    #[test]
    fn test_access_mode_parse_and_display() {
        assert_eq!("Write".parse::<AccessMode>().unwrap(), AccessMode::Write);
        assert_eq!(AccessMode::Owner.to_string(), "owner");
        assert!("superuser".parse::<AccessMode>().is_err());
    }

    #[test]
    fn test_access_mode_levels() {
        for mode in [
            AccessMode::None,
            AccessMode::Read,
            AccessMode::Write,
            AccessMode::Admin,
            AccessMode::Owner,
        ] {
            assert_eq!(AccessMode::from_level(mode.level()), mode);
        }
        assert_eq!(AccessMode::from_level(-3), AccessMode::None);
        assert_eq!(AccessMode::from_level(9), AccessMode::Owner);
    }

    #[test]
    fn test_access_mode_serialization() {
        let json = serde_json::to_string(&AccessMode::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }

    #[test]
    fn test_unit_type_parse() {
        assert_eq!("pull_requests".parse::<UnitType>().unwrap(), UnitType::PullRequests);
        assert!("boards".parse::<UnitType>().is_err());
    }

    #[test]
    fn test_owner_team_effective_mode() {
        let owners = team("Owners", AccessMode::Read);
        assert!(owners.is_owner_team());
        assert_eq!(owners.effective_mode(), AccessMode::Owner);
        assert_eq!(owners.unit_access_mode(UnitType::Wiki), AccessMode::Owner);

        let devs = team("Devs", AccessMode::Write);
        assert!(!devs.is_owner_team());
        assert_eq!(devs.effective_mode(), AccessMode::Write);
    }

    #[test]
    fn test_unit_access_mode_falls_back_to_team_mode() {
        let devs = team("Devs", AccessMode::Write);
        assert_eq!(devs.unit_access_mode(UnitType::Wiki), AccessMode::Read);
        assert_eq!(devs.unit_access_mode(UnitType::Code), AccessMode::Write);
    }

    #[test]
    fn test_update_params_start_from_team() {
        let devs = team("Devs", AccessMode::Write);
        let params = TeamUpdateParams::from_team(&devs).access_mode(AccessMode::Admin);
        assert_eq!(params.name, "Devs");
        assert_eq!(params.access_mode, AccessMode::Admin);
        assert!(params.units.is_empty());
    }

    #[test]
    fn test_detach_modes() {
        assert_eq!(
            DetachMode::default(),
            DetachMode {
                force: false,
                recalculate: true
            }
        );
        let deleted = DetachMode::repository_deleted();
        assert!(deleted.force);
        assert!(!deleted.recalculate);
    }
}
