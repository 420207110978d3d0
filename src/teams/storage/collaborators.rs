//! Collaborator services reconciled by team operations.
//!
//! These are owned elsewhere (watches, issues, organizations, branch
//! protection); team operations only need these narrow capabilities.

use crate::error::Result;
use crate::teams::types::{OrgId, ProtectedBranch, RepoId, UserId};
use async_trait::async_trait;

/// Repository and issue watch subscriptions.
#[async_trait]
pub trait WatchService: Send {
    /// Watch or unwatch a repository. Idempotent.
    async fn set_watch(&mut self, user_id: UserId, repo_id: RepoId, watching: bool) -> Result<()>;

    /// Watch a repository as a best-effort side effect.
    ///
    /// On failure only this write is undone; the enclosing transaction stays
    /// usable and can still commit.
    async fn try_watch(&mut self, user_id: UserId, repo_id: RepoId) -> Result<()> {
        self.set_watch(user_id, repo_id, true).await
    }

    async fn is_watching(&mut self, user_id: UserId, repo_id: RepoId) -> Result<bool>;

    /// Drop every issue watch the user holds in the repository.
    async fn remove_issue_watches(&mut self, user_id: UserId, repo_id: RepoId) -> Result<u64>;
}

/// Issue and pull request assignees.
#[async_trait]
pub trait IssueAssignmentService: Send {
    /// Remove the user from the assignees of every issue in the repository.
    ///
    /// Returns the number of issues changed.
    async fn unassign_user_from_repo_issues(
        &mut self,
        user_id: UserId,
        repo_id: RepoId,
    ) -> Result<u64>;
}

/// Organization existence and team counter.
#[async_trait]
pub trait OrganizationStore: Send {
    async fn organization_exists(&mut self, org_id: OrgId) -> Result<bool>;

    /// Atomically add `delta` to the organization's team counter.
    async fn adjust_num_teams(&mut self, org_id: OrgId, delta: i64) -> Result<()>;
}

/// Organization membership edges.
#[async_trait]
pub trait OrgMembershipService: Send {
    /// Add the user to the organization. Idempotent.
    async fn add_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<()>;

    /// Remove the user from the organization. Idempotent.
    async fn remove_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<()>;

    async fn is_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<bool>;
}

/// Protected branch rules.
#[async_trait]
pub trait BranchProtectionStore: Send {
    /// Rules on every repository owned by the organization.
    async fn find_by_owner(&mut self, org_id: OrgId) -> Result<Vec<ProtectedBranch>>;

    /// Persist the three team whitelists of the rule.
    async fn update_whitelists(&mut self, branch: &ProtectedBranch) -> Result<()>;
}
