//! Team manager.
//!
//! Handles team lifecycle and repository links. Every public operation runs
//! in one transaction: it commits on success and rolls back on any error,
//! cancellation or deadline.

use super::access::AccessMaintainer;
use super::audit::{TeamAuditEntry, TeamAuditEvent};
use super::config::TeamsConfig;
use super::context::OpContext;
use super::error::{Result, TeamError};
use super::reconcile::{reconcile_lost_access, scrub_branch_protections};
use super::repo_link;
use super::storage::{
    OptionalAuditStore, OrgMembershipService, OrganizationStore, RelationshipStore,
    RepositoryStore, TeamAuditStore, TeamTransaction, TransactionRunner, WithAuditStore,
};
use super::types::{
    AccessMode, DetachMode, LinkOutcome, OrgId, RepoId, Repository, Team, TeamCreateParams,
    TeamId, TeamUnit, TeamUpdateParams, UnitType,
};
use super::utils::{truncate_chars, validate_team_name};
use tracing::{debug, info, instrument, warn};

/// Team manager - create, update and delete teams and link repositories.
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse::teams::{OpContext, TeamCreateParams, TeamManager, TeamsConfig};
///
/// let manager = TeamManager::new(store, TeamsConfig::default())
///     .with_audit_store(audit_store);
///
/// let team = manager
///     .create_team(&OpContext::new(), TeamCreateParams::new(org_id, "backend"))
///     .await?;
/// manager.attach_repository(&OpContext::new(), team.id, repo_id).await?;
/// ```
pub struct TeamManager<R, A = ()>
where
    R: TransactionRunner,
    A: OptionalAuditStore,
{
    runner: R,
    config: TeamsConfig,
    maintainer: AccessMaintainer,
    audit_store: A,
}

impl<R> TeamManager<R, ()>
where
    R: TransactionRunner,
{
    /// Create a new team manager.
    #[must_use]
    pub fn new(runner: R, config: TeamsConfig) -> Self {
        Self {
            maintainer: AccessMaintainer::new(config.access_batch_size),
            runner,
            config,
            audit_store: (),
        }
    }

    /// Enable audit logging with the given store.
    pub fn with_audit_store<AuditStore: TeamAuditStore + Clone + 'static>(
        self,
        audit_store: AuditStore,
    ) -> TeamManager<R, WithAuditStore<AuditStore>> {
        TeamManager {
            runner: self.runner,
            config: self.config,
            maintainer: self.maintainer,
            audit_store: WithAuditStore(audit_store),
        }
    }
}

impl<R, A> TeamManager<R, A>
where
    R: TransactionRunner,
    A: OptionalAuditStore,
{
    /// Get a reference to the transaction runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn config(&self) -> &TeamsConfig {
        &self.config
    }

    /// Create a team.
    ///
    /// With `includes_all_repositories`, every current organization
    /// repository is attached in the same transaction.
    #[instrument(skip(self, ctx, params), fields(org_id = params.org_id, name = %params.name))]
    pub async fn create_team(&self, ctx: &OpContext, params: TeamCreateParams) -> Result<Team> {
        validate_team_name(&params.name)?;

        let team = ctx
            .run(self.config.operation_timeout(), self.create_team_tx(params))
            .await?;

        info!(team_id = team.id, org_id = team.org_id, num_repos = team.num_repos, "Team created");
        self.audit_store
            .record(
                TeamAuditEntry::new(TeamAuditEvent::TeamCreated, team.org_id, team.id, ctx.actor_id())
                    .with_details(format!("name={}, mode={}", team.name, team.access_mode)),
            )
            .await;
        Ok(team)
    }

    async fn create_team_tx(&self, params: TeamCreateParams) -> Result<Team> {
        let mut tx = self.runner.begin().await?;

        if !tx.organization_exists(params.org_id).await? {
            return Err(TeamError::OrganizationNotFound {
                org_id: params.org_id,
            });
        }

        let lower_name = params.name.to_lowercase();
        if tx
            .find_team_by_lower_name(params.org_id, &lower_name)
            .await?
            .is_some()
        {
            return Err(TeamError::team_already_exists(params.org_id, params.name));
        }

        let mut team = Team {
            id: 0,
            org_id: params.org_id,
            lower_name,
            description: truncate_chars(&params.description, self.config.max_description_length),
            name: params.name,
            access_mode: params.access_mode,
            can_create_org_repo: params.can_create_org_repo,
            includes_all_repositories: params.includes_all_repositories,
            num_repos: 0,
            num_members: 0,
            units: Vec::new(),
        };
        team.id = tx.insert_team(&team).await.map_err(|e| {
            if e.is_conflict() {
                TeamError::team_already_exists(team.org_id, team.name.clone())
            } else {
                e.into()
            }
        })?;

        team.units = build_units(&team, &params.units);
        tx.replace_units(team.id, &team.units).await?;

        if team.includes_all_repositories {
            let attached = repo_link::attach_all(
                &mut tx,
                &self.maintainer,
                &mut team,
                self.config.auto_watch_new_repos,
            )
            .await?;
            debug!(team_id = team.id, attached, "Attached all organization repositories");
        }

        tx.adjust_num_teams(team.org_id, 1).await?;
        tx.commit().await?;
        Ok(team)
    }

    /// Update a team's mutable columns.
    ///
    /// Changing the access mode recomputes every attached repository; newly
    /// setting `includes_all_repositories` attaches every organization
    /// repository.
    ///
    /// # Errors
    ///
    /// [`TeamError::OwnerTeamImmutable`] when the update renames the owner
    /// team or changes its access mode.
    #[instrument(skip(self, ctx, params), fields(team_id = params.team_id))]
    pub async fn update_team(&self, ctx: &OpContext, params: TeamUpdateParams) -> Result<Team> {
        validate_team_name(&params.name)?;

        let (team, access_changed) = ctx
            .run(self.config.operation_timeout(), self.update_team_tx(params))
            .await?;

        info!(team_id = team.id, access_changed, "Team updated");
        self.audit_store
            .record(
                TeamAuditEntry::new(TeamAuditEvent::TeamUpdated, team.org_id, team.id, ctx.actor_id())
                    .with_details(format!("name={}, mode={}", team.name, team.access_mode)),
            )
            .await;
        Ok(team)
    }

    async fn update_team_tx(&self, params: TeamUpdateParams) -> Result<(Team, bool)> {
        let mut tx = self.runner.begin().await?;

        let stored = tx
            .get_team(params.team_id)
            .await?
            .ok_or(TeamError::TeamNotFound {
                team_id: params.team_id,
            })?;

        let mut team = stored.clone();
        if stored.is_owner_team() {
            if params.name != stored.name || params.access_mode != stored.access_mode {
                return Err(TeamError::OwnerTeamImmutable { team_id: stored.id });
            }
        } else {
            let lower_name = params.name.to_lowercase();
            if let Some(other) = tx.find_team_by_lower_name(stored.org_id, &lower_name).await? {
                if other.id != stored.id {
                    return Err(TeamError::team_already_exists(stored.org_id, params.name));
                }
            }
            team.name = params.name;
            team.lower_name = lower_name;
            team.access_mode = params.access_mode;
        }
        team.description = truncate_chars(&params.description, self.config.max_description_length);
        team.can_create_org_repo = params.can_create_org_repo;
        team.includes_all_repositories = params.includes_all_repositories;

        let access_changed = team.effective_mode() != stored.effective_mode();
        let includes_all_newly_set =
            team.includes_all_repositories && !stored.includes_all_repositories;

        tx.update_team(&team).await?;
        if !params.units.is_empty() {
            team.units = build_units(&team, &params.units);
            tx.replace_units(team.id, &team.units).await?;
        }

        if access_changed {
            let lowered = team.effective_mode() < stored.effective_mode();
            let members = if lowered {
                tx.list_team_member_ids(team.id).await?
            } else {
                Vec::new()
            };

            for repo_id in tx.list_team_repo_ids(team.id).await? {
                let Some(repo) = tx.get_by_id(repo_id).await? else {
                    warn!(team_id = team.id, repo_id, "Team links a missing repository");
                    continue;
                };
                self.maintainer
                    .recalculate_team_accesses(&mut tx, &repo, None)
                    .await?;
                for &user_id in &members {
                    reconcile_lost_access(&mut tx, &repo, user_id).await?;
                }
            }
        }

        if includes_all_newly_set {
            repo_link::attach_all(
                &mut tx,
                &self.maintainer,
                &mut team,
                self.config.auto_watch_new_repos,
            )
            .await?;
        }

        tx.commit().await?;
        Ok((team, access_changed))
    }

    /// Delete a team.
    ///
    /// Scrubs the team from branch protection whitelists, detaches every
    /// repository with a per-repository recompute, removes memberships and
    /// units, and drops organization membership for users left in no team.
    #[instrument(skip(self, ctx))]
    pub async fn delete_team(&self, ctx: &OpContext, team_id: TeamId) -> Result<()> {
        let team = ctx
            .run(self.config.operation_timeout(), self.delete_team_tx(team_id))
            .await?;

        info!(team_id, org_id = team.org_id, "Team deleted");
        self.audit_store
            .record(
                TeamAuditEntry::new(TeamAuditEvent::TeamDeleted, team.org_id, team.id, ctx.actor_id())
                    .with_details(format!("name={}", team.name)),
            )
            .await;
        Ok(())
    }

    async fn delete_team_tx(&self, team_id: TeamId) -> Result<Team> {
        let mut tx = self.runner.begin().await?;
        let mut team = tx
            .get_team(team_id)
            .await?
            .ok_or(TeamError::TeamNotFound { team_id })?;

        let scrubbed = scrub_branch_protections(&mut tx, team.org_id, team.id).await?;
        let detached = repo_link::detach_all(
            &mut tx,
            &self.maintainer,
            &mut team,
            DetachMode::new().force(true),
        )
        .await?;

        let members = tx.list_team_member_ids(team.id).await?;
        tx.delete_team_users(team.id).await?;
        for user_id in members {
            if tx.count_user_teams_in_org(team.org_id, user_id).await? == 0 {
                tx.remove_member(team.org_id, user_id).await?;
            }
        }

        tx.delete_units(team.id).await?;
        tx.delete_team(team.id).await?;
        tx.adjust_num_teams(team.org_id, -1).await?;
        tx.commit().await?;

        debug!(team_id, scrubbed, detached, "Team rows removed");
        Ok(team)
    }

    /// Link a repository to the team.
    ///
    /// Already linked is a no-op.
    #[instrument(skip(self, ctx))]
    pub async fn attach_repository(
        &self,
        ctx: &OpContext,
        team_id: TeamId,
        repo_id: RepoId,
    ) -> Result<LinkOutcome> {
        let (team, outcome) = ctx
            .run(self.config.operation_timeout(), async {
                let mut tx = self.runner.begin().await?;
                let mut team = load_team(&mut tx, team_id).await?;
                let repo = load_repository(&mut tx, repo_id).await?;
                let outcome = repo_link::attach(
                    &mut tx,
                    &self.maintainer,
                    &mut team,
                    &repo,
                    self.config.auto_watch_new_repos,
                )
                .await?;
                if outcome.changed() {
                    tx.commit().await?;
                }
                Ok::<_, TeamError>((team, outcome))
            })
            .await?;

        if outcome.changed() {
            info!(team_id, repo_id, "Repository attached to team");
            self.record_link(&team, TeamAuditEvent::RepositoryAttached, repo_id, ctx)
                .await;
        }
        Ok(outcome)
    }

    /// Unlink a repository from the team.
    ///
    /// Not linked is a no-op. A team that includes all repositories refuses
    /// unless `mode.force` is set.
    #[instrument(skip(self, ctx))]
    pub async fn detach_repository(
        &self,
        ctx: &OpContext,
        team_id: TeamId,
        repo_id: RepoId,
        mode: DetachMode,
    ) -> Result<LinkOutcome> {
        let (team, outcome) = ctx
            .run(self.config.operation_timeout(), async {
                let mut tx = self.runner.begin().await?;
                let mut team = load_team(&mut tx, team_id).await?;
                let repo = load_repository(&mut tx, repo_id).await?;
                let outcome =
                    repo_link::detach(&mut tx, &self.maintainer, &mut team, &repo, mode).await?;
                if outcome.changed() {
                    tx.commit().await?;
                }
                Ok::<_, TeamError>((team, outcome))
            })
            .await?;

        if outcome.changed() {
            info!(team_id, repo_id, "Repository detached from team");
            self.record_link(&team, TeamAuditEvent::RepositoryDetached, repo_id, ctx)
                .await;
        }
        Ok(outcome)
    }

    /// Attach every organization repository not yet linked.
    ///
    /// Returns the number newly attached.
    #[instrument(skip(self, ctx))]
    pub async fn attach_all_repositories(&self, ctx: &OpContext, team_id: TeamId) -> Result<usize> {
        let (team, attached) = ctx
            .run(self.config.operation_timeout(), async {
                let mut tx = self.runner.begin().await?;
                let mut team = load_team(&mut tx, team_id).await?;
                let attached = repo_link::attach_all(
                    &mut tx,
                    &self.maintainer,
                    &mut team,
                    self.config.auto_watch_new_repos,
                )
                .await?;
                tx.commit().await?;
                Ok::<_, TeamError>((team, attached))
            })
            .await?;

        info!(team_id, attached, "Attached all repositories");
        if attached > 0 {
            self.audit_store
                .record(
                    TeamAuditEntry::new(
                        TeamAuditEvent::RepositoryAttached,
                        team.org_id,
                        team.id,
                        ctx.actor_id(),
                    )
                    .with_details(format!("all repositories, attached={attached}")),
                )
                .await;
        }
        Ok(attached)
    }

    /// Detach every repository of the team.
    ///
    /// A no-op returning 0 when the team includes all repositories.
    #[instrument(skip(self, ctx))]
    pub async fn detach_all_repositories(&self, ctx: &OpContext, team_id: TeamId) -> Result<usize> {
        let (team, detached) = ctx
            .run(self.config.operation_timeout(), async {
                let mut tx = self.runner.begin().await?;
                let mut team = load_team(&mut tx, team_id).await?;
                if team.includes_all_repositories {
                    return Ok((team, 0));
                }
                let detached =
                    repo_link::detach_all(&mut tx, &self.maintainer, &mut team, DetachMode::new())
                        .await?;
                tx.commit().await?;
                Ok::<_, TeamError>((team, detached))
            })
            .await?;

        info!(team_id, detached, "Detached all repositories");
        if detached > 0 {
            self.audit_store
                .record(
                    TeamAuditEntry::new(
                        TeamAuditEvent::RepositoryDetached,
                        team.org_id,
                        team.id,
                        ctx.actor_id(),
                    )
                    .with_details(format!("all repositories, detached={detached}")),
                )
                .await;
        }
        Ok(detached)
    }

    /// Whether the repository is linked to the team.
    pub async fn has_repository(
        &self,
        ctx: &OpContext,
        team_id: TeamId,
        repo_id: RepoId,
    ) -> Result<bool> {
        ctx.run(self.config.operation_timeout(), async {
            let mut tx = self.runner.begin().await?;
            Ok::<_, TeamError>(tx.has_team_repo(team_id, repo_id).await?)
        })
        .await
    }

    /// Get a team by ID.
    pub async fn get_team(&self, ctx: &OpContext, team_id: TeamId) -> Result<Team> {
        ctx.run(self.config.operation_timeout(), async {
            let mut tx = self.runner.begin().await?;
            load_team(&mut tx, team_id).await
        })
        .await
    }

    /// Find a team by name, case-insensitively.
    pub async fn find_team_by_name(
        &self,
        ctx: &OpContext,
        org_id: OrgId,
        name: &str,
    ) -> Result<Option<Team>> {
        ctx.run(self.config.operation_timeout(), async {
            let mut tx = self.runner.begin().await?;
            Ok::<_, TeamError>(
                tx.find_team_by_lower_name(org_id, &name.to_lowercase())
                    .await?,
            )
        })
        .await
    }

    /// Repositories linked to the team.
    pub async fn list_repositories(
        &self,
        ctx: &OpContext,
        team_id: TeamId,
    ) -> Result<Vec<Repository>> {
        ctx.run(self.config.operation_timeout(), async {
            let mut tx = self.runner.begin().await?;
            let team = load_team(&mut tx, team_id).await?;
            let mut repos = Vec::new();
            for repo_id in tx.list_team_repo_ids(team.id).await? {
                if let Some(repo) = tx.get_by_id(repo_id).await? {
                    repos.push(repo);
                }
            }
            Ok::<_, TeamError>(repos)
        })
        .await
    }

    async fn record_link(
        &self,
        team: &Team,
        event: TeamAuditEvent,
        repo_id: RepoId,
        ctx: &OpContext,
    ) {
        self.audit_store
            .record(
                TeamAuditEntry::new(event, team.org_id, team.id, ctx.actor_id()).with_target(repo_id),
            )
            .await;
    }
}

pub(crate) async fn load_team<T: TeamTransaction>(tx: &mut T, team_id: TeamId) -> Result<Team> {
    tx.get_team(team_id)
        .await?
        .ok_or(TeamError::TeamNotFound { team_id })
}

pub(crate) async fn load_repository<T: TeamTransaction>(
    tx: &mut T,
    repo_id: RepoId,
) -> Result<Repository> {
    tx.get_by_id(repo_id)
        .await?
        .ok_or(TeamError::RepositoryNotFound { repo_id })
}

fn build_units(team: &Team, units: &[(UnitType, AccessMode)]) -> Vec<TeamUnit> {
    let mut built: Vec<TeamUnit> = Vec::with_capacity(units.len());
    for &(unit_type, access_mode) in units {
        let unit = TeamUnit {
            org_id: team.org_id,
            team_id: team.id,
            unit_type,
            access_mode,
        };
        match built.iter_mut().find(|u| u.unit_type == unit_type) {
            Some(existing) => *existing = unit,
            None => built.push(unit),
        }
    }
    built
}
