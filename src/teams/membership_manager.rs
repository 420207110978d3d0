//! Team membership manager.
//!
//! Handles adding and removing single users, with the owner-team safety
//! check and organization membership cleanup.

use super::access::AccessMaintainer;
use super::audit::{TeamAuditEntry, TeamAuditEvent};
use super::config::TeamsConfig;
use super::context::OpContext;
use super::error::{Result, TeamError};
use super::manager::load_team;
use super::reconcile::reconcile_lost_access;
use super::storage::{
    OptionalAuditStore, OrgMembershipService, RelationshipStore, RepositoryStore,
    TeamAuditStore, TeamTransaction, TransactionRunner, WithAuditStore,
};
use super::types::{MembershipOutcome, RepoId, Team, TeamId, TeamUser, UserId};
use super::watch_dispatch::{AutoWatchJob, NoopWatchDispatcher, WatchDispatcher};
use tracing::{debug, info, instrument, warn};

/// Membership manager - adds and removes team members.
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse::teams::{QueuedWatchDispatcher, TeamMembershipManager};
///
/// let manager = TeamMembershipManager::new(store, config.teams.clone())
///     .with_watch_dispatcher(QueuedWatchDispatcher::new(queue.clone()));
///
/// manager.add_member(&OpContext::new(), team_id, user_id).await?;
/// ```
///
/// # Auto-watch
///
/// When `auto_watch_new_repos` is enabled, a newly added member is subscribed
/// to the team's repositories after the transaction commits, through the
/// configured [`WatchDispatcher`]. The default dispatcher drops the work.
pub struct TeamMembershipManager<R, D = NoopWatchDispatcher, A = ()>
where
    R: TransactionRunner,
    D: WatchDispatcher,
    A: OptionalAuditStore,
{
    runner: R,
    config: TeamsConfig,
    maintainer: AccessMaintainer,
    dispatcher: D,
    audit_store: A,
}

impl<R> TeamMembershipManager<R, NoopWatchDispatcher, ()>
where
    R: TransactionRunner,
{
    /// Create a membership manager without auto-watch dispatch or audit logging.
    #[must_use]
    pub fn new(runner: R, config: TeamsConfig) -> Self {
        Self {
            maintainer: AccessMaintainer::new(config.access_batch_size),
            runner,
            config,
            dispatcher: NoopWatchDispatcher,
            audit_store: (),
        }
    }
}

impl<R, A> TeamMembershipManager<R, NoopWatchDispatcher, A>
where
    R: TransactionRunner,
    A: OptionalAuditStore,
{
    /// Dispatch post-commit auto-watch work through `dispatcher`.
    pub fn with_watch_dispatcher<D: WatchDispatcher>(
        self,
        dispatcher: D,
    ) -> TeamMembershipManager<R, D, A> {
        TeamMembershipManager {
            runner: self.runner,
            config: self.config,
            maintainer: self.maintainer,
            dispatcher,
            audit_store: self.audit_store,
        }
    }
}

impl<R, D> TeamMembershipManager<R, D, ()>
where
    R: TransactionRunner,
    D: WatchDispatcher,
{
    /// Enable audit logging with the given store.
    pub fn with_audit_store<AuditStore: TeamAuditStore + Clone + 'static>(
        self,
        audit_store: AuditStore,
    ) -> TeamMembershipManager<R, D, WithAuditStore<AuditStore>> {
        TeamMembershipManager {
            runner: self.runner,
            config: self.config,
            maintainer: self.maintainer,
            dispatcher: self.dispatcher,
            audit_store: WithAuditStore(audit_store),
        }
    }
}

impl<R, D, A> TeamMembershipManager<R, D, A>
where
    R: TransactionRunner,
    D: WatchDispatcher,
    A: OptionalAuditStore,
{
    /// Get a reference to the transaction runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Add a user to a team.
    ///
    /// The user joins the organization if needed and gets at least the team's
    /// mode on every team repository. An existing member, including one added
    /// concurrently, yields [`MembershipOutcome::AlreadyMember`].
    #[instrument(skip(self, ctx))]
    pub async fn add_member(
        &self,
        ctx: &OpContext,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<MembershipOutcome> {
        let added = ctx
            .run(
                self.config.operation_timeout(),
                self.add_member_tx(team_id, user_id),
            )
            .await?;

        let Some((team, repo_ids)) = added else {
            debug!(team_id, user_id, "User already a team member");
            return Ok(MembershipOutcome::AlreadyMember);
        };

        info!(team_id, user_id, org_id = team.org_id, "Team member added");

        if self.config.auto_watch_new_repos && !repo_ids.is_empty() {
            let job = AutoWatchJob { user_id, repo_ids };
            if let Err(e) = self.dispatcher.dispatch(job).await {
                warn!(team_id, user_id, error = %e, "Failed to dispatch auto-watch job");
            }
        }

        self.audit_store
            .record(
                TeamAuditEntry::new(TeamAuditEvent::MemberAdded, team.org_id, team.id, ctx.actor_id())
                    .with_target(user_id),
            )
            .await;
        Ok(MembershipOutcome::Added)
    }

    /// Returns the team and its repository IDs when the user was added,
    /// `None` when the user already was a member.
    async fn add_member_tx(
        &self,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<Option<(Team, Vec<RepoId>)>> {
        let mut tx = self.runner.begin().await?;
        let mut team = load_team(&mut tx, team_id).await?;

        if tx.is_team_member(team.id, user_id).await? {
            return Ok(None);
        }

        tx.add_member(team.org_id, user_id).await?;

        let edge = TeamUser {
            org_id: team.org_id,
            team_id: team.id,
            user_id,
        };
        match tx.insert_team_user(&edge).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        tx.adjust_num_members(team.id, 1).await?;
        team.num_members += 1;

        let repo_ids = tx.list_team_repo_ids(team.id).await?;
        self.maintainer
            .grant_member_accesses(&mut tx, &team, user_id, &repo_ids)
            .await?;

        tx.commit().await?;
        Ok(Some((team, repo_ids)))
    }

    /// Remove a user from a team.
    ///
    /// The user's access to every team repository is recomputed, watches and
    /// assignments on repositories it can no longer see are dropped, and the
    /// user leaves the organization when it is in no other team there.
    ///
    /// # Errors
    ///
    /// [`TeamError::LastOwner`] when the user is the owner team's only member.
    #[instrument(skip(self, ctx))]
    pub async fn remove_member(
        &self,
        ctx: &OpContext,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<MembershipOutcome> {
        let removed = ctx
            .run(
                self.config.operation_timeout(),
                self.remove_member_tx(team_id, user_id),
            )
            .await?;

        let Some((team, left_org)) = removed else {
            debug!(team_id, user_id, "User not a team member");
            return Ok(MembershipOutcome::NotMember);
        };

        info!(team_id, user_id, org_id = team.org_id, left_org, "Team member removed");
        self.audit_store
            .record(
                TeamAuditEntry::new(TeamAuditEvent::MemberRemoved, team.org_id, team.id, ctx.actor_id())
                    .with_target(user_id),
            )
            .await;
        Ok(MembershipOutcome::Removed)
    }

    /// Returns the team and whether the user left the organization, or `None`
    /// when the user was not a member.
    async fn remove_member_tx(
        &self,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<Option<(Team, bool)>> {
        let mut tx = self.runner.begin().await?;
        let mut team = load_team(&mut tx, team_id).await?;

        if !tx.is_team_member(team.id, user_id).await? {
            return Ok(None);
        }
        if team.is_owner_team() && team.num_members <= 1 {
            return Err(TeamError::LastOwner { user_id });
        }

        tx.delete_team_user(team.id, user_id).await?;
        tx.adjust_num_members(team.id, -1).await?;
        team.num_members -= 1;

        for repo_id in tx.list_team_repo_ids(team.id).await? {
            let Some(repo) = tx.get_by_id(repo_id).await? else {
                warn!(team_id, repo_id, "Team links a missing repository");
                continue;
            };
            self.maintainer
                .recalculate_user_access(&mut tx, &repo, user_id)
                .await?;
            reconcile_lost_access(&mut tx, &repo, user_id).await?;
        }

        let left_org = tx.count_user_teams_in_org(team.org_id, user_id).await? == 0;
        if left_org {
            tx.remove_member(team.org_id, user_id).await?;
        }

        tx.commit().await?;
        Ok(Some((team, left_org)))
    }

    /// Whether the user belongs to the team.
    pub async fn is_member(&self, ctx: &OpContext, team_id: TeamId, user_id: UserId) -> Result<bool> {
        ctx.run(self.config.operation_timeout(), async {
            let mut tx = self.runner.begin().await?;
            Ok::<_, TeamError>(tx.is_team_member(team_id, user_id).await?)
        })
        .await
    }

    /// IDs of the team's members.
    pub async fn list_members(&self, ctx: &OpContext, team_id: TeamId) -> Result<Vec<UserId>> {
        ctx.run(self.config.operation_timeout(), async {
            let mut tx = self.runner.begin().await?;
            let team = load_team(&mut tx, team_id).await?;
            Ok::<_, TeamError>(tx.list_team_member_ids(team.id).await?)
        })
        .await
    }
}
