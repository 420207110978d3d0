//! Single-repository attach and detach, shared by the team operations.

use super::access::AccessMaintainer;
use super::error::{Result, TeamError};
use super::reconcile::reconcile_lost_access;
use super::storage::TeamTransaction;
use super::types::{DetachMode, LinkOutcome, Repository, Team, TeamRepo};
use tracing::{debug, warn};

/// Link `repo` to `team` and grant the team's members access.
///
/// With `auto_watch`, every current member watches the repository; a failed
/// watch is logged and skipped.
pub(crate) async fn attach<T: TeamTransaction>(
    tx: &mut T,
    maintainer: &AccessMaintainer,
    team: &mut Team,
    repo: &Repository,
    auto_watch: bool,
) -> Result<LinkOutcome> {
    if repo.owner_id != team.org_id {
        return Err(TeamError::RepositoryNotInOrganization {
            repo_id: repo.id,
            org_id: team.org_id,
        });
    }
    if tx.has_team_repo(team.id, repo.id).await? {
        return Ok(LinkOutcome::AlreadyAttached);
    }

    tx.insert_team_repo(&TeamRepo {
        org_id: team.org_id,
        team_id: team.id,
        repo_id: repo.id,
    })
    .await?;
    tx.adjust_num_repos(team.id, 1).await?;
    team.num_repos += 1;

    maintainer.recalculate_team_accesses(tx, repo, None).await?;

    if auto_watch {
        for user_id in tx.list_team_member_ids(team.id).await? {
            if let Err(e) = tx.try_watch(user_id, repo.id).await {
                warn!(
                    team_id = team.id,
                    repo_id = repo.id,
                    user_id,
                    error = %e,
                    "Failed to watch attached repository"
                );
            }
        }
    }

    debug!(team_id = team.id, repo_id = repo.id, "Repository attached");
    Ok(LinkOutcome::Attached)
}

/// Unlink `repo` from `team` and reconcile members who lost access.
pub(crate) async fn detach<T: TeamTransaction>(
    tx: &mut T,
    maintainer: &AccessMaintainer,
    team: &mut Team,
    repo: &Repository,
    mode: DetachMode,
) -> Result<LinkOutcome> {
    if !tx.has_team_repo(team.id, repo.id).await? {
        return Ok(LinkOutcome::NotAttached);
    }
    if team.includes_all_repositories && !mode.force {
        return Err(TeamError::IncludesAllRepositories { team_id: team.id });
    }

    tx.delete_team_repo(team.id, repo.id).await?;
    tx.adjust_num_repos(team.id, -1).await?;
    team.num_repos -= 1;

    if mode.recalculate {
        maintainer
            .recalculate_team_accesses(tx, repo, Some(team.id))
            .await?;
    }

    let mut reconciled = 0;
    for user_id in tx.list_team_member_ids(team.id).await? {
        if reconcile_lost_access(tx, repo, user_id).await? {
            reconciled += 1;
        }
    }

    debug!(
        team_id = team.id,
        repo_id = repo.id,
        reconciled,
        "Repository detached"
    );
    Ok(LinkOutcome::Detached)
}

/// Attach every organization repository not yet linked to the team.
///
/// Returns the number of repositories newly attached.
pub(crate) async fn attach_all<T: TeamTransaction>(
    tx: &mut T,
    maintainer: &AccessMaintainer,
    team: &mut Team,
    auto_watch: bool,
) -> Result<usize> {
    let mut attached = 0;
    for repo in tx.list_by_owner(team.org_id).await? {
        if attach(tx, maintainer, team, &repo, auto_watch)
            .await?
            .changed()
        {
            attached += 1;
        }
    }
    Ok(attached)
}

/// Detach every repository of the team.
///
/// Returns the number of repositories detached. Edges pointing at
/// repositories that no longer exist are dropped without recalculation.
pub(crate) async fn detach_all<T: TeamTransaction>(
    tx: &mut T,
    maintainer: &AccessMaintainer,
    team: &mut Team,
    mode: DetachMode,
) -> Result<usize> {
    let mut detached = 0;
    for repo_id in tx.list_team_repo_ids(team.id).await? {
        let Some(repo) = tx.get_by_id(repo_id).await? else {
            warn!(team_id = team.id, repo_id, "Dropping link to missing repository");
            if tx.delete_team_repo(team.id, repo_id).await? {
                tx.adjust_num_repos(team.id, -1).await?;
                team.num_repos -= 1;
                detached += 1;
            }
            continue;
        };
        if detach(tx, maintainer, team, &repo, mode).await?.changed() {
            detached += 1;
        }
    }
    Ok(detached)
}
