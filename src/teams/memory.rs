//! In-memory team store.
//!
//! Implements every storage trait on a snapshot of shared state. `begin`
//! takes the state lock, so transactions are serialized; `commit` publishes
//! the snapshot and dropping the handle discards it.

use super::audit::TeamAuditEntry;
use super::storage::{
    AccessChecker, AccessStore, BranchProtectionStore, IssueAssignmentService,
    OrgMembershipService, OrganizationStore, RelationshipStore, RepositoryStore, TeamAuditStore,
    TeamTransaction, TransactionRunner, WatchService,
};
use super::types::{
    Access, AccessMode, Collaboration, IssueId, OrgId, ProtectedBranch, RepoId, Repository, Team,
    TeamId, TeamRepo, TeamUnit, TeamUser, UserId,
};
use crate::error::{GatehouseError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Storage call that can be made to fail, for exercising rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertTeamUser,
    /// `insert_team_user` reports a uniqueness conflict, as when a concurrent
    /// transaction inserted the same edge first.
    TeamUserConflict,
    InsertAccesses,
    RaiseAccesses,
    DeleteAccess,
    SetWatch,
    UnassignIssues,
    UpdateWhitelists,
    AdjustNumTeams,
    Commit,
}

/// Seeded issue with its assignees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueRecord {
    pub repo_id: RepoId,
    pub assignees: BTreeSet<UserId>,
}

/// Complete state of an [`InMemoryTeamStore`].
///
/// Exposed through [`InMemoryTeamStore::snapshot`] so tests can compare the
/// maintained projection with one recomputed from the edges.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub organizations: BTreeMap<OrgId, i64>,
    pub org_members: BTreeSet<(OrgId, UserId)>,
    pub teams: BTreeMap<TeamId, Team>,
    pub team_repos: BTreeMap<(TeamId, RepoId), OrgId>,
    pub team_users: BTreeMap<(TeamId, UserId), OrgId>,
    pub accesses: BTreeMap<(UserId, RepoId), AccessMode>,
    pub collaborations: BTreeMap<(RepoId, UserId), AccessMode>,
    pub repositories: BTreeMap<RepoId, Repository>,
    pub watches: BTreeSet<(UserId, RepoId)>,
    pub issues: BTreeMap<IssueId, IssueRecord>,
    pub issue_watches: BTreeSet<(UserId, IssueId)>,
    pub protected_branches: BTreeMap<i64, ProtectedBranch>,
    /// Number of protected branch writes, to check diff-before-write.
    pub whitelist_writes: usize,
    /// Number of access insert batches, to check batching.
    pub access_insert_batches: usize,
    next_team_id: TeamId,
    next_issue_id: IssueId,
    fail_point: Option<FailPoint>,
    /// Set by a failed storage call; the transaction can no longer commit.
    aborted: bool,
}

impl MemoryState {
    fn check(&mut self, point: FailPoint) -> Result<()> {
        if self.fail_point != Some(point) {
            return Ok(());
        }
        self.aborted = true;
        Err(match point {
            FailPoint::TeamUserConflict => {
                GatehouseError::conflict(format!("injected failure: {point:?}"))
            }
            _ => GatehouseError::internal(format!("injected failure: {point:?}")),
        })
    }

    fn team_mut(&mut self, team_id: TeamId) -> Result<&mut Team> {
        self.teams
            .get_mut(&team_id)
            .ok_or_else(|| GatehouseError::not_found(format!("team {team_id}")))
    }

    fn org_of_repo(&self, repo_id: RepoId) -> Option<OrgId> {
        self.repositories.get(&repo_id).map(|r| r.owner_id)
    }
}

/// In-memory store implementing every team storage trait.
///
/// Cloning shares the same underlying data.
#[derive(Clone, Default)]
pub struct InMemoryTeamStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryTeamStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make the given storage call fail until cleared.
    pub async fn inject_failure(&self, point: FailPoint) {
        self.state.lock().await.fail_point = Some(point);
    }

    pub async fn clear_failure(&self) {
        self.state.lock().await.fail_point = None;
    }

    // === Seeding helpers (for test setup) ===

    pub async fn add_organization(&self, org_id: OrgId) {
        self.state.lock().await.organizations.entry(org_id).or_insert(0);
    }

    pub async fn add_repository(&self, repo: Repository) {
        self.state.lock().await.repositories.insert(repo.id, repo);
    }

    pub async fn remove_repository(&self, repo_id: RepoId) {
        self.state.lock().await.repositories.remove(&repo_id);
    }

    /// Add a direct collaborator grant and project it.
    pub async fn add_collaboration(&self, repo_id: RepoId, user_id: UserId, mode: AccessMode) {
        let mut state = self.state.lock().await;
        state.collaborations.insert((repo_id, user_id), mode);
        if mode.is_granted() {
            let entry = state.accesses.entry((user_id, repo_id)).or_insert(mode);
            *entry = (*entry).max(mode);
        }
    }

    pub async fn add_protected_branch(&self, branch: ProtectedBranch) {
        self.state
            .lock()
            .await
            .protected_branches
            .insert(branch.id, branch);
    }

    pub async fn add_watch(&self, user_id: UserId, repo_id: RepoId) {
        self.state.lock().await.watches.insert((user_id, repo_id));
    }

    /// Add an issue with the given assignees and return its ID.
    pub async fn add_issue(&self, repo_id: RepoId, assignees: &[UserId]) -> IssueId {
        let mut state = self.state.lock().await;
        state.next_issue_id += 1;
        let id = state.next_issue_id;
        state.issues.insert(
            id,
            IssueRecord {
                repo_id,
                assignees: assignees.iter().copied().collect(),
            },
        );
        id
    }

    pub async fn add_issue_watch(&self, user_id: UserId, issue_id: IssueId) {
        self.state.lock().await.issue_watches.insert((user_id, issue_id));
    }

    // === Inspection helpers ===

    pub async fn access(&self, user_id: UserId, repo_id: RepoId) -> Option<AccessMode> {
        self.state
            .lock()
            .await
            .accesses
            .get(&(user_id, repo_id))
            .copied()
    }

    pub async fn team(&self, team_id: TeamId) -> Option<Team> {
        self.state.lock().await.teams.get(&team_id).cloned()
    }

    pub async fn watching(&self, user_id: UserId, repo_id: RepoId) -> bool {
        self.state.lock().await.watches.contains(&(user_id, repo_id))
    }

    pub async fn issue_assignees(&self, issue_id: IssueId) -> BTreeSet<UserId> {
        self.state
            .lock()
            .await
            .issues
            .get(&issue_id)
            .map(|issue| issue.assignees.clone())
            .unwrap_or_default()
    }

    pub async fn watches_issue(&self, user_id: UserId, issue_id: IssueId) -> bool {
        self.state
            .lock()
            .await
            .issue_watches
            .contains(&(user_id, issue_id))
    }

    pub async fn org_member(&self, org_id: OrgId, user_id: UserId) -> bool {
        self.state.lock().await.org_members.contains(&(org_id, user_id))
    }

    pub async fn num_teams(&self, org_id: OrgId) -> Option<i64> {
        self.state.lock().await.organizations.get(&org_id).copied()
    }

    pub async fn protected_branch(&self, id: i64) -> Option<ProtectedBranch> {
        self.state.lock().await.protected_branches.get(&id).cloned()
    }
}

#[async_trait]
impl TransactionRunner for InMemoryTeamStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

/// Transaction over an [`InMemoryTeamStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl TeamTransaction for InMemoryTransaction {
    async fn commit(mut self) -> Result<()> {
        if self.working.aborted {
            return Err(GatehouseError::internal(
                "transaction aborted by an earlier failed statement",
            ));
        }
        self.working.check(FailPoint::Commit)?;
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for InMemoryTransaction {
    async fn get_team(&mut self, team_id: TeamId) -> Result<Option<Team>> {
        Ok(self.working.teams.get(&team_id).cloned())
    }

    async fn find_team_by_lower_name(
        &mut self,
        org_id: OrgId,
        lower_name: &str,
    ) -> Result<Option<Team>> {
        Ok(self
            .working
            .teams
            .values()
            .find(|t| t.org_id == org_id && t.lower_name == lower_name)
            .cloned())
    }

    async fn insert_team(&mut self, team: &Team) -> Result<TeamId> {
        let duplicate = self
            .working
            .teams
            .values()
            .any(|t| t.org_id == team.org_id && t.lower_name == team.lower_name);
        if duplicate {
            return Err(GatehouseError::conflict(format!(
                "team ({}, {})",
                team.org_id, team.lower_name
            )));
        }

        self.working.next_team_id += 1;
        let id = self.working.next_team_id;
        self.working.teams.insert(
            id,
            Team {
                id,
                units: Vec::new(),
                ..team.clone()
            },
        );
        Ok(id)
    }

    async fn update_team(&mut self, team: &Team) -> Result<()> {
        let stored = self.working.team_mut(team.id)?;
        stored.name = team.name.clone();
        stored.lower_name = team.lower_name.clone();
        stored.description = team.description.clone();
        stored.access_mode = team.access_mode;
        stored.can_create_org_repo = team.can_create_org_repo;
        stored.includes_all_repositories = team.includes_all_repositories;
        Ok(())
    }

    async fn delete_team(&mut self, team_id: TeamId) -> Result<()> {
        self.working.teams.remove(&team_id);
        Ok(())
    }

    async fn replace_units(&mut self, team_id: TeamId, units: &[TeamUnit]) -> Result<()> {
        self.working.team_mut(team_id)?.units = units.to_vec();
        Ok(())
    }

    async fn delete_units(&mut self, team_id: TeamId) -> Result<()> {
        if let Some(team) = self.working.teams.get_mut(&team_id) {
            team.units.clear();
        }
        Ok(())
    }

    async fn adjust_num_repos(&mut self, team_id: TeamId, delta: i64) -> Result<()> {
        self.working.team_mut(team_id)?.num_repos += delta;
        Ok(())
    }

    async fn adjust_num_members(&mut self, team_id: TeamId, delta: i64) -> Result<()> {
        self.working.team_mut(team_id)?.num_members += delta;
        Ok(())
    }

    async fn has_team_repo(&mut self, team_id: TeamId, repo_id: RepoId) -> Result<bool> {
        Ok(self.working.team_repos.contains_key(&(team_id, repo_id)))
    }

    async fn insert_team_repo(&mut self, edge: &TeamRepo) -> Result<()> {
        let key = (edge.team_id, edge.repo_id);
        if self.working.team_repos.contains_key(&key) {
            return Err(GatehouseError::conflict(format!("team_repo {key:?}")));
        }
        self.working.team_repos.insert(key, edge.org_id);
        Ok(())
    }

    async fn delete_team_repo(&mut self, team_id: TeamId, repo_id: RepoId) -> Result<bool> {
        Ok(self.working.team_repos.remove(&(team_id, repo_id)).is_some())
    }

    async fn delete_team_repos(&mut self, team_id: TeamId) -> Result<u64> {
        let before = self.working.team_repos.len();
        self.working.team_repos.retain(|(t, _), _| *t != team_id);
        Ok((before - self.working.team_repos.len()) as u64)
    }

    async fn list_team_repo_ids(&mut self, team_id: TeamId) -> Result<Vec<RepoId>> {
        Ok(self
            .working
            .team_repos
            .range((team_id, RepoId::MIN)..=(team_id, RepoId::MAX))
            .map(|((_, repo_id), _)| *repo_id)
            .collect())
    }

    async fn list_teams_for_repo(&mut self, repo_id: RepoId) -> Result<Vec<Team>> {
        Ok(self
            .working
            .team_repos
            .keys()
            .filter(|(_, r)| *r == repo_id)
            .filter_map(|(team_id, _)| self.working.teams.get(team_id).cloned())
            .collect())
    }

    async fn is_team_member(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool> {
        Ok(self.working.team_users.contains_key(&(team_id, user_id)))
    }

    async fn insert_team_user(&mut self, edge: &TeamUser) -> Result<()> {
        self.working.check(FailPoint::InsertTeamUser)?;
        self.working.check(FailPoint::TeamUserConflict)?;
        let key = (edge.team_id, edge.user_id);
        if self.working.team_users.contains_key(&key) {
            return Err(GatehouseError::conflict(format!("team_user {key:?}")));
        }
        self.working.team_users.insert(key, edge.org_id);
        Ok(())
    }

    async fn delete_team_user(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool> {
        Ok(self.working.team_users.remove(&(team_id, user_id)).is_some())
    }

    async fn delete_team_users(&mut self, team_id: TeamId) -> Result<u64> {
        let before = self.working.team_users.len();
        self.working.team_users.retain(|(t, _), _| *t != team_id);
        Ok((before - self.working.team_users.len()) as u64)
    }

    async fn list_team_member_ids(&mut self, team_id: TeamId) -> Result<Vec<UserId>> {
        Ok(self
            .working
            .team_users
            .range((team_id, UserId::MIN)..=(team_id, UserId::MAX))
            .map(|((_, user_id), _)| *user_id)
            .collect())
    }

    async fn count_user_teams_in_org(&mut self, org_id: OrgId, user_id: UserId) -> Result<u64> {
        Ok(self
            .working
            .team_users
            .iter()
            .filter(|((_, u), o)| *u == user_id && **o == org_id)
            .count() as u64)
    }
}

#[async_trait]
impl AccessStore for InMemoryTransaction {
    async fn get_access(
        &mut self,
        user_id: UserId,
        repo_id: RepoId,
    ) -> Result<Option<AccessMode>> {
        Ok(self.working.accesses.get(&(user_id, repo_id)).copied())
    }

    async fn list_repo_accesses(&mut self, repo_id: RepoId) -> Result<Vec<Access>> {
        Ok(self
            .working
            .accesses
            .iter()
            .filter(|((_, r), _)| *r == repo_id)
            .map(|(&(user_id, repo_id), &mode)| Access {
                user_id,
                repo_id,
                mode,
            })
            .collect())
    }

    async fn list_user_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<Vec<Access>> {
        Ok(repo_ids
            .iter()
            .filter_map(|&repo_id| {
                self.working
                    .accesses
                    .get(&(user_id, repo_id))
                    .map(|&mode| Access {
                        user_id,
                        repo_id,
                        mode,
                    })
            })
            .collect())
    }

    async fn upsert_access(&mut self, access: &Access) -> Result<()> {
        self.working
            .accesses
            .insert((access.user_id, access.repo_id), access.mode);
        Ok(())
    }

    async fn delete_access(&mut self, user_id: UserId, repo_id: RepoId) -> Result<()> {
        self.working.check(FailPoint::DeleteAccess)?;
        self.working.accesses.remove(&(user_id, repo_id));
        Ok(())
    }

    async fn insert_accesses(&mut self, accesses: &[Access]) -> Result<()> {
        self.working.check(FailPoint::InsertAccesses)?;
        for access in accesses {
            let key = (access.user_id, access.repo_id);
            if self.working.accesses.contains_key(&key) {
                return Err(GatehouseError::conflict(format!("access {key:?}")));
            }
            self.working.accesses.insert(key, access.mode);
        }
        self.working.access_insert_batches += 1;
        Ok(())
    }

    async fn raise_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
        mode: AccessMode,
    ) -> Result<u64> {
        self.working.check(FailPoint::RaiseAccesses)?;
        let mut raised = 0;
        for &repo_id in repo_ids {
            if let Some(existing) = self.working.accesses.get_mut(&(user_id, repo_id)) {
                if *existing < mode {
                    *existing = mode;
                    raised += 1;
                }
            }
        }
        Ok(raised)
    }

    async fn list_collaborations(&mut self, repo_id: RepoId) -> Result<Vec<Collaboration>> {
        Ok(self
            .working
            .collaborations
            .range((repo_id, UserId::MIN)..=(repo_id, UserId::MAX))
            .map(|(&(repo_id, user_id), &mode)| Collaboration {
                repo_id,
                user_id,
                mode,
            })
            .collect())
    }

    async fn get_collaboration(
        &mut self,
        repo_id: RepoId,
        user_id: UserId,
    ) -> Result<Option<AccessMode>> {
        Ok(self.working.collaborations.get(&(repo_id, user_id)).copied())
    }
}

#[async_trait]
impl RepositoryStore for InMemoryTransaction {
    async fn list_by_owner(&mut self, org_id: OrgId) -> Result<Vec<Repository>> {
        Ok(self
            .working
            .repositories
            .values()
            .filter(|r| r.owner_id == org_id)
            .cloned()
            .collect())
    }

    async fn get_by_id(&mut self, repo_id: RepoId) -> Result<Option<Repository>> {
        Ok(self.working.repositories.get(&repo_id).cloned())
    }
}

impl AccessChecker for InMemoryTransaction {}

#[async_trait]
impl WatchService for InMemoryTransaction {
    async fn set_watch(&mut self, user_id: UserId, repo_id: RepoId, watching: bool) -> Result<()> {
        self.working.check(FailPoint::SetWatch)?;
        if watching {
            self.working.watches.insert((user_id, repo_id));
        } else {
            self.working.watches.remove(&(user_id, repo_id));
        }
        Ok(())
    }

    async fn try_watch(&mut self, user_id: UserId, repo_id: RepoId) -> Result<()> {
        let aborted = self.working.aborted;
        let result = self.set_watch(user_id, repo_id, true).await;
        if result.is_err() {
            self.working.aborted = aborted;
        }
        result
    }

    async fn is_watching(&mut self, user_id: UserId, repo_id: RepoId) -> Result<bool> {
        Ok(self.working.watches.contains(&(user_id, repo_id)))
    }

    async fn remove_issue_watches(&mut self, user_id: UserId, repo_id: RepoId) -> Result<u64> {
        let issues = &self.working.issues;
        let before = self.working.issue_watches.len();
        self.working.issue_watches.retain(|(u, issue_id)| {
            *u != user_id || issues.get(issue_id).is_none_or(|i| i.repo_id != repo_id)
        });
        Ok((before - self.working.issue_watches.len()) as u64)
    }
}

#[async_trait]
impl IssueAssignmentService for InMemoryTransaction {
    async fn unassign_user_from_repo_issues(
        &mut self,
        user_id: UserId,
        repo_id: RepoId,
    ) -> Result<u64> {
        self.working.check(FailPoint::UnassignIssues)?;
        let mut changed = 0;
        for issue in self.working.issues.values_mut() {
            if issue.repo_id == repo_id && issue.assignees.remove(&user_id) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl OrganizationStore for InMemoryTransaction {
    async fn organization_exists(&mut self, org_id: OrgId) -> Result<bool> {
        Ok(self.working.organizations.contains_key(&org_id))
    }

    async fn adjust_num_teams(&mut self, org_id: OrgId, delta: i64) -> Result<()> {
        self.working.check(FailPoint::AdjustNumTeams)?;
        let count = self
            .working
            .organizations
            .get_mut(&org_id)
            .ok_or_else(|| GatehouseError::not_found(format!("organization {org_id}")))?;
        *count += delta;
        Ok(())
    }
}

#[async_trait]
impl OrgMembershipService for InMemoryTransaction {
    async fn add_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<()> {
        self.working.org_members.insert((org_id, user_id));
        Ok(())
    }

    async fn remove_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<()> {
        self.working.org_members.remove(&(org_id, user_id));
        Ok(())
    }

    async fn is_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<bool> {
        Ok(self.working.org_members.contains(&(org_id, user_id)))
    }
}

#[async_trait]
impl BranchProtectionStore for InMemoryTransaction {
    async fn find_by_owner(&mut self, org_id: OrgId) -> Result<Vec<ProtectedBranch>> {
        Ok(self
            .working
            .protected_branches
            .values()
            .filter(|b| self.working.org_of_repo(b.repo_id) == Some(org_id))
            .cloned()
            .collect())
    }

    async fn update_whitelists(&mut self, branch: &ProtectedBranch) -> Result<()> {
        self.working.check(FailPoint::UpdateWhitelists)?;
        let stored = self
            .working
            .protected_branches
            .get_mut(&branch.id)
            .ok_or_else(|| GatehouseError::not_found(format!("protected branch {}", branch.id)))?;
        stored.push_whitelist_team_ids = branch.push_whitelist_team_ids.clone();
        stored.merge_whitelist_team_ids = branch.merge_whitelist_team_ids.clone();
        stored.approvals_whitelist_team_ids = branch.approvals_whitelist_team_ids.clone();
        self.working.whitelist_writes += 1;
        Ok(())
    }
}

/// In-memory audit store.
#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<TeamAuditEntry>>>,
}

impl InMemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded entry, oldest first.
    pub async fn entries(&self) -> Vec<TeamAuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl TeamAuditStore for InMemoryAuditStore {
    async fn record_audit(&self, entry: &TeamAuditEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn get_team_audit_log(
        &self,
        team_id: TeamId,
        limit: usize,
    ) -> Result<Vec<TeamAuditEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.team_id == team_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_org_audit_log(&self, org_id: OrgId, limit: usize) -> Result<Vec<TeamAuditEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.org_id == org_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teams::audit::TeamAuditEvent;

    fn team(org_id: OrgId, name: &str) -> Team {
        Team {
            id: 0,
            org_id,
            name: name.to_string(),
            lower_name: name.to_lowercase(),
            description: String::new(),
            access_mode: AccessMode::Read,
            can_create_org_repo: false,
            includes_all_repositories: false,
            num_repos: 0,
            num_members: 0,
            units: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = InMemoryTeamStore::new();
        store.add_organization(1).await;

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_team(&team(1, "Devs")).await.unwrap();
        tx.adjust_num_teams(1, 1).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.team(id).await.unwrap().name, "Devs");
        assert_eq!(store.num_teams(1).await, Some(1));
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = InMemoryTeamStore::new();
        store.add_organization(1).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_team(&team(1, "Devs")).await.unwrap();
            tx.adjust_num_teams(1, 1).await.unwrap();
        }

        let state = store.snapshot().await;
        assert!(state.teams.is_empty());
        assert_eq!(state.organizations.get(&1), Some(&0));
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let store = InMemoryTeamStore::new();
        store.add_organization(1).await;
        store.inject_failure(FailPoint::Commit).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_team(&team(1, "Devs")).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert!(store.snapshot().await.teams.is_empty());
    }

    #[tokio::test]
    async fn test_failed_statement_aborts_transaction() {
        let store = InMemoryTeamStore::new();
        store.add_organization(1).await;
        store.inject_failure(FailPoint::SetWatch).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_team(&team(1, "Devs")).await.unwrap();
        assert!(tx.set_watch(7, 1, true).await.is_err());
        assert!(tx.commit().await.is_err());

        assert!(store.snapshot().await.teams.is_empty());
    }

    #[tokio::test]
    async fn test_failed_try_watch_keeps_transaction_usable() {
        let store = InMemoryTeamStore::new();
        store.add_organization(1).await;
        store.inject_failure(FailPoint::SetWatch).await;

        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_team(&team(1, "Devs")).await.unwrap();
        assert!(tx.try_watch(7, 1).await.is_err());
        tx.commit().await.unwrap();

        assert!(store.team(id).await.is_some());
        assert!(!store.watching(7, 1).await);
    }

    #[tokio::test]
    async fn test_duplicate_edges_conflict() {
        let store = InMemoryTeamStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_team(&team(1, "Devs")).await.unwrap();

        let member = TeamUser {
            org_id: 1,
            team_id: id,
            user_id: 5,
        };
        tx.insert_team_user(&member).await.unwrap();
        let err = tx.insert_team_user(&member).await.unwrap_err();
        assert!(err.is_conflict());

        let link = TeamRepo {
            org_id: 1,
            team_id: id,
            repo_id: 9,
        };
        tx.insert_team_repo(&link).await.unwrap();
        assert!(tx.insert_team_repo(&link).await.unwrap_err().is_conflict());

        assert!(tx.insert_team(&team(1, "devs")).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_raise_accesses_never_downgrades() {
        let store = InMemoryTeamStore::new();
        store.add_collaboration(1, 5, AccessMode::Admin).await;
        store.add_collaboration(2, 5, AccessMode::Read).await;

        let mut tx = store.begin().await.unwrap();
        let raised = tx.raise_accesses(5, &[1, 2, 3], AccessMode::Write).await.unwrap();
        assert_eq!(raised, 1);
        assert_eq!(tx.get_access(5, 1).await.unwrap(), Some(AccessMode::Admin));
        assert_eq!(tx.get_access(5, 2).await.unwrap(), Some(AccessMode::Write));
        assert_eq!(tx.get_access(5, 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_has_access_rules() {
        let store = InMemoryTeamStore::new();
        let private = Repository::new(1, 10, "private", true);
        let public = Repository::new(2, 10, "public", false);
        store.add_repository(private.clone()).await;
        store.add_repository(public.clone()).await;
        store.add_collaboration(1, 7, AccessMode::Read).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.has_access(10, &private).await.unwrap());
        assert!(tx.has_access(7, &private).await.unwrap());
        assert!(!tx.has_access(8, &private).await.unwrap());
        assert!(tx.has_access(8, &public).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_watch_removal_is_scoped_to_repo() {
        let store = InMemoryTeamStore::new();
        let in_repo = store.add_issue(1, &[]).await;
        let elsewhere = store.add_issue(2, &[]).await;
        store.add_issue_watch(5, in_repo).await;
        store.add_issue_watch(5, elsewhere).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.remove_issue_watches(5, 1).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert!(!store.watches_issue(5, in_repo).await);
        assert!(store.watches_issue(5, elsewhere).await);
    }

    #[tokio::test]
    async fn test_audit_log_newest_first() {
        let audit = InMemoryAuditStore::new();
        for event in [TeamAuditEvent::TeamCreated, TeamAuditEvent::MemberAdded] {
            audit
                .record_audit(&TeamAuditEntry::new(event, 1, 2, None))
                .await
                .unwrap();
        }
        audit
            .record_audit(&TeamAuditEntry::new(TeamAuditEvent::TeamCreated, 1, 3, None))
            .await
            .unwrap();

        let team_log = audit.get_team_audit_log(2, 10).await.unwrap();
        assert_eq!(team_log.len(), 2);
        assert_eq!(team_log[0].event, TeamAuditEvent::MemberAdded);

        let org_log = audit.get_org_audit_log(1, 2).await.unwrap();
        assert_eq!(org_log.len(), 2);
        assert_eq!(org_log[0].team_id, 3);
    }
}
