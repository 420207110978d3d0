//! Cascade reconciliation after access is lowered or removed.

use super::storage::{
    AccessChecker, BranchProtectionStore, IssueAssignmentService, WatchService,
};
use super::types::{OrgId, Repository, TeamId, UserId};
use crate::error::Result;
use tracing::debug;

pub use super::utils::remove_id_from_list;

/// Drop the user's watch, issue watches and issue assignments on `repo` if
/// the user can no longer see it.
///
/// Never adds a watch. Returns whether anything was reconciled.
pub async fn reconcile_lost_access<T>(tx: &mut T, repo: &Repository, user_id: UserId) -> Result<bool>
where
    T: AccessChecker + WatchService + IssueAssignmentService + ?Sized,
{
    if tx.has_access(user_id, repo).await? {
        return Ok(false);
    }

    tx.set_watch(user_id, repo.id, false).await?;
    let issue_watches = tx.remove_issue_watches(user_id, repo.id).await?;
    let unassigned = tx.unassign_user_from_repo_issues(user_id, repo.id).await?;

    debug!(
        repo_id = repo.id,
        user_id,
        issue_watches,
        unassigned,
        "Reconciled lost repository access"
    );
    Ok(true)
}

/// Remove a team from the push, merge and approvals whitelists of every
/// protected branch in the organization.
///
/// Only branches that referenced the team are written. Returns how many were.
pub async fn scrub_branch_protections<T>(tx: &mut T, org_id: OrgId, team_id: TeamId) -> Result<usize>
where
    T: BranchProtectionStore + ?Sized,
{
    let mut written = 0;
    for mut branch in tx.find_by_owner(org_id).await? {
        let (push, push_changed) = remove_id_from_list(&branch.push_whitelist_team_ids, team_id);
        let (merge, merge_changed) =
            remove_id_from_list(&branch.merge_whitelist_team_ids, team_id);
        let (approvals, approvals_changed) =
            remove_id_from_list(&branch.approvals_whitelist_team_ids, team_id);

        if !(push_changed || merge_changed || approvals_changed) {
            continue;
        }

        branch.push_whitelist_team_ids = push;
        branch.merge_whitelist_team_ids = merge;
        branch.approvals_whitelist_team_ids = approvals;
        tx.update_whitelists(&branch).await?;
        written += 1;
    }

    debug!(org_id, team_id, written, "Scrubbed branch protection whitelists");
    Ok(written)
}
