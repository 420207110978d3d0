//! Access projection rows, direct grants and repositories.

use crate::error::Result;
use crate::teams::types::{Access, AccessMode, Collaboration, OrgId, RepoId, Repository, UserId};
use async_trait::async_trait;

/// The persisted access projection and the direct grants feeding it.
#[async_trait]
pub trait AccessStore: Send {
    async fn get_access(&mut self, user_id: UserId, repo_id: RepoId)
    -> Result<Option<AccessMode>>;

    async fn list_repo_accesses(&mut self, repo_id: RepoId) -> Result<Vec<Access>>;

    /// The user's rows among `repo_ids`.
    async fn list_user_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<Vec<Access>>;

    /// Insert or overwrite a single row.
    async fn upsert_access(&mut self, access: &Access) -> Result<()>;

    async fn delete_access(&mut self, user_id: UserId, repo_id: RepoId) -> Result<()>;

    /// Insert rows that do not exist yet, as one batch.
    async fn insert_accesses(&mut self, accesses: &[Access]) -> Result<()>;

    /// Set the user's rows among `repo_ids` to `mode` where they are lower.
    ///
    /// Returns the number of rows raised.
    async fn raise_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
        mode: AccessMode,
    ) -> Result<u64>;

    /// Direct collaborator grants on the repository.
    async fn list_collaborations(&mut self, repo_id: RepoId) -> Result<Vec<Collaboration>>;

    async fn get_collaboration(
        &mut self,
        repo_id: RepoId,
        user_id: UserId,
    ) -> Result<Option<AccessMode>>;
}

/// Repository lookup.
#[async_trait]
pub trait RepositoryStore: Send {
    /// Repositories owned by the organization.
    async fn list_by_owner(&mut self, org_id: OrgId) -> Result<Vec<Repository>>;

    async fn get_by_id(&mut self, repo_id: RepoId) -> Result<Option<Repository>>;
}

/// Read-path authorization check.
#[async_trait]
pub trait AccessChecker: AccessStore + RepositoryStore {
    /// Whether the user can see the repository.
    ///
    /// True for the owner, for public repositories, and for users holding an
    /// access row of at least `Read`.
    async fn has_access(&mut self, user_id: UserId, repo: &Repository) -> Result<bool> {
        if repo.owner_id == user_id || !repo.is_private {
            return Ok(true);
        }
        Ok(self
            .get_access(user_id, repo.id)
            .await?
            .is_some_and(AccessMode::is_granted))
    }
}
