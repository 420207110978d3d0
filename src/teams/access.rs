//! Access projection maintenance.
//!
//! A user's access to a repository is the maximum mode granted by any team
//! attached to it that the user belongs to, or by a direct collaborator
//! grant. Rows for users without any grant are deleted, never stored as
//! `None`.

use super::storage::{AccessStore, RelationshipStore};
use super::types::{Access, AccessMode, Collaboration, RepoId, Repository, Team, TeamId, UserId};
use crate::error::Result;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Changes applied to the projection by one recalculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessChanges {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

impl AccessChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Compute a repository's projection from its grants.
///
/// `team_grants` holds each granting team's effective mode with its member IDs.
pub fn compute_repo_accesses<'a, I>(
    collaborations: &[Collaboration],
    team_grants: I,
) -> BTreeMap<UserId, AccessMode>
where
    I: IntoIterator<Item = (AccessMode, &'a [UserId])>,
{
    let mut modes: BTreeMap<UserId, AccessMode> = BTreeMap::new();

    let direct = collaborations.iter().map(|c| (c.user_id, c.mode));
    let via_teams = team_grants
        .into_iter()
        .flat_map(|(mode, members)| members.iter().map(move |&user_id| (user_id, mode)));

    for (user_id, mode) in direct.chain(via_teams) {
        if !mode.is_granted() {
            continue;
        }
        let entry = modes.entry(user_id).or_insert(mode);
        *entry = (*entry).max(mode);
    }
    modes
}

/// Recomputes access rows after structural changes.
#[derive(Debug, Clone, Copy)]
pub struct AccessMaintainer {
    batch_size: usize,
}

impl AccessMaintainer {
    /// Create a maintainer inserting at most `batch_size` rows per batch.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Desired modes for a repository, optionally ignoring one team and
    /// optionally restricted to one user.
    async fn desired_modes<T>(
        &self,
        tx: &mut T,
        repo_id: RepoId,
        exclude_team_id: Option<TeamId>,
        only_user: Option<UserId>,
    ) -> Result<BTreeMap<UserId, AccessMode>>
    where
        T: RelationshipStore + AccessStore + ?Sized,
    {
        let mut collaborations = tx.list_collaborations(repo_id).await?;
        if let Some(user_id) = only_user {
            collaborations.retain(|c| c.user_id == user_id);
        }

        let mut grants: Vec<(AccessMode, Vec<UserId>)> = Vec::new();
        for team in tx.list_teams_for_repo(repo_id).await? {
            if Some(team.id) == exclude_team_id || !team.effective_mode().is_granted() {
                continue;
            }
            let members = match only_user {
                Some(user_id) => {
                    if tx.is_team_member(team.id, user_id).await? {
                        vec![user_id]
                    } else {
                        Vec::new()
                    }
                }
                None => tx.list_team_member_ids(team.id).await?,
            };
            grants.push((team.effective_mode(), members));
        }

        Ok(compute_repo_accesses(
            &collaborations,
            grants.iter().map(|(mode, members)| (*mode, members.as_slice())),
        ))
    }

    /// Recompute every access row of a repository.
    ///
    /// Users reachable through direct grants or any attached team except
    /// `exclude_team_id` get the maximum granted mode. Rows of users with no
    /// remaining grant are deleted.
    pub async fn recalculate_team_accesses<T>(
        &self,
        tx: &mut T,
        repo: &Repository,
        exclude_team_id: Option<TeamId>,
    ) -> Result<AccessChanges>
    where
        T: RelationshipStore + AccessStore + ?Sized,
    {
        let desired = self
            .desired_modes(tx, repo.id, exclude_team_id, None)
            .await?;
        let current: BTreeMap<UserId, AccessMode> = tx
            .list_repo_accesses(repo.id)
            .await?
            .into_iter()
            .map(|a| (a.user_id, a.mode))
            .collect();

        let mut changes = AccessChanges::default();

        for user_id in current.keys().filter(|u| !desired.contains_key(u)) {
            tx.delete_access(*user_id, repo.id).await?;
            changes.removed += 1;
        }

        let mut inserts = Vec::new();
        for (&user_id, &mode) in &desired {
            let access = Access {
                user_id,
                repo_id: repo.id,
                mode,
            };
            match current.get(&user_id) {
                Some(existing) if *existing == mode => {}
                Some(_) => {
                    tx.upsert_access(&access).await?;
                    changes.updated += 1;
                }
                None => inserts.push(access),
            }
        }

        for batch in inserts.chunks(self.batch_size) {
            tx.insert_accesses(batch).await?;
            changes.inserted += batch.len();
        }

        debug!(
            repo_id = repo.id,
            exclude_team_id,
            inserted = changes.inserted,
            updated = changes.updated,
            removed = changes.removed,
            "Recalculated repository accesses"
        );
        Ok(changes)
    }

    /// Recompute one user's access row for a repository.
    ///
    /// Returns the resulting mode, `None` when the row was removed or absent.
    pub async fn recalculate_user_access<T>(
        &self,
        tx: &mut T,
        repo: &Repository,
        user_id: UserId,
    ) -> Result<AccessMode>
    where
        T: RelationshipStore + AccessStore + ?Sized,
    {
        let desired = self
            .desired_modes(tx, repo.id, None, Some(user_id))
            .await?
            .remove(&user_id)
            .unwrap_or_default();
        let current = tx.get_access(user_id, repo.id).await?;

        match (current, desired.is_granted()) {
            (Some(_), false) => tx.delete_access(user_id, repo.id).await?,
            (Some(existing), true) if existing == desired => {}
            (Some(_), true) => {
                tx.upsert_access(&Access {
                    user_id,
                    repo_id: repo.id,
                    mode: desired,
                })
                .await?
            }
            (None, true) => {
                tx.insert_accesses(&[Access {
                    user_id,
                    repo_id: repo.id,
                    mode: desired,
                }])
                .await?
            }
            (None, false) => {}
        }

        debug!(repo_id = repo.id, user_id, mode = %desired, "Recalculated user access");
        Ok(desired)
    }

    /// Upgrade pass for a member just added to `team`.
    ///
    /// Rows below the team's mode are raised, missing rows are inserted in
    /// batches, and stronger rows are left alone.
    pub async fn grant_member_accesses<T>(
        &self,
        tx: &mut T,
        team: &Team,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<AccessChanges>
    where
        T: AccessStore + ?Sized,
    {
        let mode = team.effective_mode();
        let mut changes = AccessChanges::default();
        if repo_ids.is_empty() || !mode.is_granted() {
            return Ok(changes);
        }

        changes.updated = usize::try_from(tx.raise_accesses(user_id, repo_ids, mode).await?)
            .unwrap_or(usize::MAX);

        let existing: HashSet<RepoId> = tx
            .list_user_accesses(user_id, repo_ids)
            .await?
            .into_iter()
            .map(|a| a.repo_id)
            .collect();
        let missing: Vec<Access> = repo_ids
            .iter()
            .filter(|id| !existing.contains(id))
            .map(|&repo_id| Access {
                user_id,
                repo_id,
                mode,
            })
            .collect();

        for batch in missing.chunks(self.batch_size) {
            tx.insert_accesses(batch).await?;
            changes.inserted += batch.len();
        }

        debug!(
            team_id = team.id,
            user_id,
            raised = changes.updated,
            inserted = changes.inserted,
            "Granted member accesses"
        );
        Ok(changes)
    }
}

impl Default for AccessMaintainer {
    fn default() -> Self {
        Self::new(100)
    }
}
