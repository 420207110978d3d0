//! Transaction handle and runner.

use super::{
    AccessChecker, BranchProtectionStore, IssueAssignmentService, OrgMembershipService,
    OrganizationStore, RelationshipStore, WatchService,
};
use crate::error::Result;
use async_trait::async_trait;

/// Everything one team operation touches, bound to one transaction.
///
/// Dropping a handle without calling [`commit`](Self::commit) rolls the
/// transaction back.
#[async_trait]
pub trait TeamTransaction:
    RelationshipStore
    + AccessChecker
    + WatchService
    + IssueAssignmentService
    + OrganizationStore
    + OrgMembershipService
    + BranchProtectionStore
    + Sized
{
    async fn commit(self) -> Result<()>;
}

/// Opens transactions.
///
/// # Example
///
/// ```rust,ignore
/// let mut tx = runner.begin().await?;
/// tx.insert_team_user(&edge).await?;
/// tx.adjust_num_members(edge.team_id, 1).await?;
/// tx.commit().await?;
/// ```
#[async_trait]
pub trait TransactionRunner: Send + Sync {
    type Tx: TeamTransaction;

    async fn begin(&self) -> Result<Self::Tx>;
}
