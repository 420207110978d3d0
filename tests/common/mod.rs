//! Shared fixtures for the team integration tests.
#![allow(dead_code)]

use gatehouse::teams::{
    AccessMode, Collaboration, InMemoryTeamStore, MemoryState, OpContext, OrgId, RepoId, Repository, Team,
    TeamCreateParams, TeamId, TeamManager, TeamMembershipManager, TeamsConfig, UserId,
    compute_repo_accesses,
};
use std::collections::BTreeMap;

pub const ORG: OrgId = 100;

pub struct Harness {
    pub store: InMemoryTeamStore,
    pub teams: TeamManager<InMemoryTeamStore>,
    pub members: TeamMembershipManager<InMemoryTeamStore>,
    pub ctx: OpContext,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(TeamsConfig::default()).await
    }

    pub async fn with_config(config: TeamsConfig) -> Self {
        let store = InMemoryTeamStore::new();
        store.add_organization(ORG).await;
        Self {
            teams: TeamManager::new(store.clone(), config.clone()),
            members: TeamMembershipManager::new(store.clone(), config),
            store,
            ctx: OpContext::new(),
        }
    }

    /// Seed a private repository owned by [`ORG`].
    pub async fn repo(&self, id: RepoId) -> Repository {
        let repo = Repository::new(id, ORG, format!("repo-{id}"), true);
        self.store.add_repository(repo.clone()).await;
        repo
    }

    pub async fn team(&self, name: &str, mode: AccessMode) -> Team {
        self.teams
            .create_team(&self.ctx, TeamCreateParams::new(ORG, name).access_mode(mode))
            .await
            .unwrap()
    }

    /// Owner team including every organization repository.
    pub async fn owners(&self) -> Team {
        self.teams
            .create_team(
                &self.ctx,
                TeamCreateParams::new(ORG, "owners")
                    .access_mode(AccessMode::Owner)
                    .includes_all_repositories(true),
            )
            .await
            .unwrap()
    }

    pub async fn add(&self, team_id: TeamId, user_id: UserId) {
        self.members
            .add_member(&self.ctx, team_id, user_id)
            .await
            .unwrap();
    }

    pub async fn attach(&self, team_id: TeamId, repo_id: RepoId) {
        self.teams
            .attach_repository(&self.ctx, team_id, repo_id)
            .await
            .unwrap();
    }
}

/// Projection recomputed from edges and direct grants.
pub fn expected_accesses(state: &MemoryState) -> BTreeMap<(UserId, RepoId), AccessMode> {
    let mut expected = BTreeMap::new();
    for &repo_id in state.repositories.keys() {
        let collaborations: Vec<_> = state
            .collaborations
            .iter()
            .filter(|((r, _), _)| *r == repo_id)
            .map(|(&(repo_id, user_id), &mode)| Collaboration {
                repo_id,
                user_id,
                mode,
            })
            .collect();

        let grants: Vec<(AccessMode, Vec<UserId>)> = state
            .team_repos
            .keys()
            .filter(|(_, r)| *r == repo_id)
            .filter_map(|(team_id, _)| state.teams.get(team_id))
            .map(|team| {
                let members = state
                    .team_users
                    .keys()
                    .filter(|(t, _)| *t == team.id)
                    .map(|&(_, user_id)| user_id)
                    .collect();
                (team.effective_mode(), members)
            })
            .collect();

        let modes = compute_repo_accesses(
            &collaborations,
            grants.iter().map(|(mode, members)| (*mode, members.as_slice())),
        );
        for (user_id, mode) in modes {
            expected.insert((user_id, repo_id), mode);
        }
    }
    expected
}

/// The maintained projection equals one recomputed from scratch.
pub async fn assert_projection_consistent(store: &InMemoryTeamStore) {
    let state = store.snapshot().await;
    assert_eq!(state.accesses, expected_accesses(&state), "access projection drifted");
}

/// Cached counters equal live edge counts.
pub async fn assert_counters_consistent(store: &InMemoryTeamStore) {
    let state = store.snapshot().await;
    for team in state.teams.values() {
        let repos = state.team_repos.keys().filter(|(t, _)| *t == team.id).count();
        let members = state.team_users.keys().filter(|(t, _)| *t == team.id).count();
        assert_eq!(team.num_repos, repos as i64, "num_repos of team {}", team.id);
        assert_eq!(team.num_members, members as i64, "num_members of team {}", team.id);
    }
    for (&org_id, &num_teams) in &state.organizations {
        let live = state.teams.values().filter(|t| t.org_id == org_id).count();
        assert_eq!(num_teams, live as i64, "num_teams of org {org_id}");
    }
}

pub async fn assert_invariants(store: &InMemoryTeamStore) {
    assert_projection_consistent(store).await;
    assert_counters_consistent(store).await;
}
