//! SeaORM-backed team storage.
//!
//! Every team operation runs inside one [`DatabaseTransaction`]; dropping a
//! [`SeaOrmTransaction`] without committing rolls it back.
//!
//! # Example
//!
//! ```rust,ignore
//! use gatehouse::teams::{SeaOrmTeamStore, TeamManager};
//!
//! let store = SeaOrmTeamStore::new(db.clone());
//! let teams = TeamManager::new(store.clone(), config.teams.clone());
//! ```
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE organization (
//!     id BIGINT PRIMARY KEY,
//!     num_teams BIGINT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE org_user (
//!     id BIGSERIAL PRIMARY KEY,
//!     uid BIGINT NOT NULL,
//!     org_id BIGINT NOT NULL,
//!     UNIQUE (uid, org_id)
//! );
//!
//! CREATE TABLE team (
//!     id BIGSERIAL PRIMARY KEY,
//!     org_id BIGINT NOT NULL,
//!     lower_name VARCHAR(255) NOT NULL,
//!     name VARCHAR(255) NOT NULL,
//!     description VARCHAR(255) NOT NULL,
//!     authorize SMALLINT NOT NULL,
//!     can_create_org_repo BOOLEAN NOT NULL,
//!     includes_all_repositories BOOLEAN NOT NULL,
//!     num_repos BIGINT NOT NULL DEFAULT 0,
//!     num_members BIGINT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE team_unit (
//!     id BIGSERIAL PRIMARY KEY,
//!     org_id BIGINT NOT NULL,
//!     team_id BIGINT NOT NULL,
//!     unit_type VARCHAR(32) NOT NULL,
//!     access_mode SMALLINT NOT NULL,
//!     UNIQUE (team_id, unit_type)
//! );
//!
//! CREATE TABLE team_repo (
//!     id BIGSERIAL PRIMARY KEY,
//!     org_id BIGINT NOT NULL,
//!     team_id BIGINT NOT NULL,
//!     repo_id BIGINT NOT NULL,
//!     UNIQUE (team_id, repo_id)
//! );
//!
//! CREATE TABLE team_user (
//!     id BIGSERIAL PRIMARY KEY,
//!     org_id BIGINT NOT NULL,
//!     team_id BIGINT NOT NULL,
//!     uid BIGINT NOT NULL,
//!     UNIQUE (team_id, uid)
//! );
//!
//! CREATE TABLE access (
//!     id BIGSERIAL PRIMARY KEY,
//!     user_id BIGINT NOT NULL,
//!     repo_id BIGINT NOT NULL,
//!     mode SMALLINT NOT NULL,
//!     UNIQUE (user_id, repo_id)
//! );
//!
//! CREATE TABLE collaboration (
//!     id BIGSERIAL PRIMARY KEY,
//!     repo_id BIGINT NOT NULL,
//!     user_id BIGINT NOT NULL,
//!     mode SMALLINT NOT NULL,
//!     UNIQUE (repo_id, user_id)
//! );
//!
//! CREATE TABLE repository (
//!     id BIGINT PRIMARY KEY,
//!     owner_id BIGINT NOT NULL,
//!     name VARCHAR(255) NOT NULL,
//!     is_private BOOLEAN NOT NULL
//! );
//!
//! CREATE TABLE watch (
//!     id BIGSERIAL PRIMARY KEY,
//!     user_id BIGINT NOT NULL,
//!     repo_id BIGINT NOT NULL,
//!     UNIQUE (user_id, repo_id)
//! );
//!
//! CREATE TABLE issue (
//!     id BIGSERIAL PRIMARY KEY,
//!     repo_id BIGINT NOT NULL
//! );
//!
//! CREATE TABLE issue_assignees (
//!     id BIGSERIAL PRIMARY KEY,
//!     assignee_id BIGINT NOT NULL,
//!     issue_id BIGINT NOT NULL
//! );
//!
//! CREATE TABLE issue_watch (
//!     id BIGSERIAL PRIMARY KEY,
//!     user_id BIGINT NOT NULL,
//!     issue_id BIGINT NOT NULL
//! );
//!
//! CREATE TABLE protected_branch (
//!     id BIGSERIAL PRIMARY KEY,
//!     repo_id BIGINT NOT NULL,
//!     branch_name VARCHAR(255) NOT NULL,
//!     whitelist_team_ids TEXT NOT NULL,
//!     merge_whitelist_team_ids TEXT NOT NULL,
//!     approvals_whitelist_team_ids TEXT NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QuerySelect, Set, SqlErr, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use std::collections::HashMap;
use tracing::warn;

use super::storage::{
    AccessChecker, AccessStore, BranchProtectionStore, IssueAssignmentService,
    OrgMembershipService, OrganizationStore, RelationshipStore, RepositoryStore, TeamTransaction,
    TransactionRunner, WatchService,
};
use super::types::{
    Access, AccessMode, Collaboration, OrgId, ProtectedBranch, RepoId, Repository, Team, TeamId,
    TeamRepo, TeamUnit, TeamUser, UnitType, UserId,
};
use crate::GatehouseError;
use crate::error::Result;

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    pub mod organization {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "organization")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i64,
            pub num_teams: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod org_user {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "org_user")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub uid: i64,
            pub org_id: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod team {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "team")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub org_id: i64,
            pub lower_name: String,
            pub name: String,
            pub description: String,
            pub authorize: i16,
            pub can_create_org_repo: bool,
            pub includes_all_repositories: bool,
            pub num_repos: i64,
            pub num_members: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod team_unit {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "team_unit")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub org_id: i64,
            pub team_id: i64,
            pub unit_type: String,
            pub access_mode: i16,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod team_repo {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "team_repo")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub org_id: i64,
            pub team_id: i64,
            pub repo_id: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod team_user {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "team_user")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub org_id: i64,
            pub team_id: i64,
            pub uid: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod access {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "access")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub user_id: i64,
            pub repo_id: i64,
            pub mode: i16,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod collaboration {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "collaboration")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub repo_id: i64,
            pub user_id: i64,
            pub mode: i16,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod repository {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "repository")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i64,
            pub owner_id: i64,
            pub name: String,
            pub is_private: bool,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod watch {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "watch")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub user_id: i64,
            pub repo_id: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod issue {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "issue")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub repo_id: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod issue_assignees {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "issue_assignees")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub assignee_id: i64,
            pub issue_id: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod issue_watch {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "issue_watch")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub user_id: i64,
            pub issue_id: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod protected_branch {
        use sea_orm::entity::prelude::*;

        /// Whitelists are stored as JSON arrays of team IDs.
        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "protected_branch")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub repo_id: i64,
            pub branch_name: String,
            pub whitelist_team_ids: String,
            pub merge_whitelist_team_ids: String,
            pub approvals_whitelist_team_ids: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{
    access, collaboration, issue, issue_assignees, issue_watch, org_user, organization,
    protected_branch, repository, team, team_repo, team_unit, team_user, watch,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// Map a database error, reporting unique violations as conflicts.
fn db_err(err: DbErr) -> GatehouseError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => GatehouseError::Conflict(msg),
        _ => GatehouseError::Database(err.to_string()),
    }
}

fn model_to_team(model: team::Model, units: Vec<TeamUnit>) -> Team {
    Team {
        id: model.id,
        org_id: model.org_id,
        name: model.name,
        lower_name: model.lower_name,
        description: model.description,
        access_mode: AccessMode::from_level(model.authorize),
        can_create_org_repo: model.can_create_org_repo,
        includes_all_repositories: model.includes_all_repositories,
        num_repos: model.num_repos,
        num_members: model.num_members,
        units,
    }
}

fn model_to_unit(model: team_unit::Model) -> Option<TeamUnit> {
    match model.unit_type.parse::<UnitType>() {
        Ok(unit_type) => Some(TeamUnit {
            org_id: model.org_id,
            team_id: model.team_id,
            unit_type,
            access_mode: AccessMode::from_level(model.access_mode),
        }),
        Err(_) => {
            warn!(team_id = model.team_id, unit_type = %model.unit_type, "Skipping unknown team unit");
            None
        }
    }
}

fn model_to_repository(model: repository::Model) -> Repository {
    Repository {
        id: model.id,
        owner_id: model.owner_id,
        name: model.name,
        is_private: model.is_private,
    }
}

/// Malformed whitelists are an error; rewriting one would lose its contents.
fn parse_team_ids(branch_id: i64, raw: &str) -> Result<Vec<TeamId>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|e| {
        GatehouseError::internal(format!(
            "malformed team whitelist on protected branch {branch_id}: {e}"
        ))
    })
}

async fn insert_watch<C: ConnectionTrait>(conn: &C, user_id: UserId, repo_id: RepoId) -> Result<()> {
    let model = watch::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        repo_id: Set(repo_id),
    };
    watch::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([watch::Column::UserId, watch::Column::RepoId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

fn model_to_branch(model: protected_branch::Model) -> Result<ProtectedBranch> {
    Ok(ProtectedBranch {
        push_whitelist_team_ids: parse_team_ids(model.id, &model.whitelist_team_ids)?,
        merge_whitelist_team_ids: parse_team_ids(model.id, &model.merge_whitelist_team_ids)?,
        approvals_whitelist_team_ids: parse_team_ids(
            model.id,
            &model.approvals_whitelist_team_ids,
        )?,
        id: model.id,
        repo_id: model.repo_id,
        branch_name: model.branch_name,
    })
}

// =============================================================================
// SeaOrmTeamStore
// =============================================================================

/// SeaORM-backed store opening one database transaction per team operation.
#[derive(Clone, Debug)]
pub struct SeaOrmTeamStore {
    db: DatabaseConnection,
}

impl SeaOrmTeamStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl TransactionRunner for SeaOrmTeamStore {
    type Tx = SeaOrmTransaction;

    async fn begin(&self) -> Result<SeaOrmTransaction> {
        let txn = self.db.begin().await.map_err(db_err)?;
        Ok(SeaOrmTransaction { txn })
    }
}

/// One open database transaction.
pub struct SeaOrmTransaction {
    txn: DatabaseTransaction,
}

impl SeaOrmTransaction {
    async fn load_units(&self, team_ids: &[TeamId]) -> Result<HashMap<TeamId, Vec<TeamUnit>>> {
        let mut by_team: HashMap<TeamId, Vec<TeamUnit>> = HashMap::new();
        if team_ids.is_empty() {
            return Ok(by_team);
        }
        let rows = team_unit::Entity::find()
            .filter(team_unit::Column::TeamId.is_in(team_ids.iter().copied()))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        for unit in rows.into_iter().filter_map(model_to_unit) {
            by_team.entry(unit.team_id).or_default().push(unit);
        }
        Ok(by_team)
    }

    async fn load_teams(&self, models: Vec<team::Model>) -> Result<Vec<Team>> {
        let ids: Vec<TeamId> = models.iter().map(|m| m.id).collect();
        let mut units = self.load_units(&ids).await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let team_units = units.remove(&m.id).unwrap_or_default();
                model_to_team(m, team_units)
            })
            .collect())
    }

    async fn issue_ids(&self, repo_id: RepoId) -> Result<Vec<i64>> {
        issue::Entity::find()
            .select_only()
            .column(issue::Column::Id)
            .filter(issue::Column::RepoId.eq(repo_id))
            .into_tuple::<i64>()
            .all(&self.txn)
            .await
            .map_err(db_err)
    }
}

// =============================================================================
// RelationshipStore Implementation
// =============================================================================

#[async_trait]
impl RelationshipStore for SeaOrmTransaction {
    async fn get_team(&mut self, team_id: TeamId) -> Result<Option<Team>> {
        let Some(model) = team::Entity::find_by_id(team_id)
            .one(&self.txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        Ok(self.load_teams(vec![model]).await?.pop())
    }

    async fn find_team_by_lower_name(
        &mut self,
        org_id: OrgId,
        lower_name: &str,
    ) -> Result<Option<Team>> {
        let Some(model) = team::Entity::find()
            .filter(team::Column::OrgId.eq(org_id))
            .filter(team::Column::LowerName.eq(lower_name))
            .one(&self.txn)
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        Ok(self.load_teams(vec![model]).await?.pop())
    }

    async fn insert_team(&mut self, t: &Team) -> Result<TeamId> {
        let model = team::ActiveModel {
            id: NotSet,
            org_id: Set(t.org_id),
            lower_name: Set(t.lower_name.clone()),
            name: Set(t.name.clone()),
            description: Set(t.description.clone()),
            authorize: Set(t.access_mode.level()),
            can_create_org_repo: Set(t.can_create_org_repo),
            includes_all_repositories: Set(t.includes_all_repositories),
            num_repos: Set(t.num_repos),
            num_members: Set(t.num_members),
        };
        let res = team::Entity::insert(model)
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.last_insert_id)
    }

    async fn update_team(&mut self, t: &Team) -> Result<()> {
        let res = team::Entity::update_many()
            .col_expr(team::Column::Name, Expr::value(t.name.clone()))
            .col_expr(team::Column::LowerName, Expr::value(t.lower_name.clone()))
            .col_expr(team::Column::Description, Expr::value(t.description.clone()))
            .col_expr(team::Column::Authorize, Expr::value(t.access_mode.level()))
            .col_expr(
                team::Column::CanCreateOrgRepo,
                Expr::value(t.can_create_org_repo),
            )
            .col_expr(
                team::Column::IncludesAllRepositories,
                Expr::value(t.includes_all_repositories),
            )
            .filter(team::Column::Id.eq(t.id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        if res.rows_affected == 0 {
            return Err(GatehouseError::not_found(format!("team {}", t.id)));
        }
        Ok(())
    }

    async fn delete_team(&mut self, team_id: TeamId) -> Result<()> {
        team::Entity::delete_by_id(team_id)
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn replace_units(&mut self, team_id: TeamId, units: &[TeamUnit]) -> Result<()> {
        self.delete_units(team_id).await?;
        if units.is_empty() {
            return Ok(());
        }
        let models = units.iter().map(|u| team_unit::ActiveModel {
            id: NotSet,
            org_id: Set(u.org_id),
            team_id: Set(team_id),
            unit_type: Set(u.unit_type.as_str().to_string()),
            access_mode: Set(u.access_mode.level()),
        });
        team_unit::Entity::insert_many(models)
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_units(&mut self, team_id: TeamId) -> Result<()> {
        team_unit::Entity::delete_many()
            .filter(team_unit::Column::TeamId.eq(team_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn adjust_num_repos(&mut self, team_id: TeamId, delta: i64) -> Result<()> {
        team::Entity::update_many()
            .col_expr(
                team::Column::NumRepos,
                Expr::col(team::Column::NumRepos).add(delta),
            )
            .filter(team::Column::Id.eq(team_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn adjust_num_members(&mut self, team_id: TeamId, delta: i64) -> Result<()> {
        team::Entity::update_many()
            .col_expr(
                team::Column::NumMembers,
                Expr::col(team::Column::NumMembers).add(delta),
            )
            .filter(team::Column::Id.eq(team_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn has_team_repo(&mut self, team_id: TeamId, repo_id: RepoId) -> Result<bool> {
        let count = team_repo::Entity::find()
            .filter(team_repo::Column::TeamId.eq(team_id))
            .filter(team_repo::Column::RepoId.eq(repo_id))
            .count(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn insert_team_repo(&mut self, edge: &TeamRepo) -> Result<()> {
        let model = team_repo::ActiveModel {
            id: NotSet,
            org_id: Set(edge.org_id),
            team_id: Set(edge.team_id),
            repo_id: Set(edge.repo_id),
        };
        team_repo::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_team_repo(&mut self, team_id: TeamId, repo_id: RepoId) -> Result<bool> {
        let res = team_repo::Entity::delete_many()
            .filter(team_repo::Column::TeamId.eq(team_id))
            .filter(team_repo::Column::RepoId.eq(repo_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected > 0)
    }

    async fn delete_team_repos(&mut self, team_id: TeamId) -> Result<u64> {
        let res = team_repo::Entity::delete_many()
            .filter(team_repo::Column::TeamId.eq(team_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected)
    }

    async fn list_team_repo_ids(&mut self, team_id: TeamId) -> Result<Vec<RepoId>> {
        team_repo::Entity::find()
            .select_only()
            .column(team_repo::Column::RepoId)
            .filter(team_repo::Column::TeamId.eq(team_id))
            .into_tuple::<i64>()
            .all(&self.txn)
            .await
            .map_err(db_err)
    }

    async fn list_teams_for_repo(&mut self, repo_id: RepoId) -> Result<Vec<Team>> {
        let team_ids: Vec<TeamId> = team_repo::Entity::find()
            .select_only()
            .column(team_repo::Column::TeamId)
            .filter(team_repo::Column::RepoId.eq(repo_id))
            .into_tuple::<i64>()
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        if team_ids.is_empty() {
            return Ok(Vec::new());
        }
        let models = team::Entity::find()
            .filter(team::Column::Id.is_in(team_ids))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        self.load_teams(models).await
    }

    async fn is_team_member(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool> {
        let count = team_user::Entity::find()
            .filter(team_user::Column::TeamId.eq(team_id))
            .filter(team_user::Column::Uid.eq(user_id))
            .count(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn insert_team_user(&mut self, edge: &TeamUser) -> Result<()> {
        let model = team_user::ActiveModel {
            id: NotSet,
            org_id: Set(edge.org_id),
            team_id: Set(edge.team_id),
            uid: Set(edge.user_id),
        };
        team_user::Entity::insert(model)
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_team_user(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool> {
        let res = team_user::Entity::delete_many()
            .filter(team_user::Column::TeamId.eq(team_id))
            .filter(team_user::Column::Uid.eq(user_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected > 0)
    }

    async fn delete_team_users(&mut self, team_id: TeamId) -> Result<u64> {
        let res = team_user::Entity::delete_many()
            .filter(team_user::Column::TeamId.eq(team_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected)
    }

    async fn list_team_member_ids(&mut self, team_id: TeamId) -> Result<Vec<UserId>> {
        team_user::Entity::find()
            .select_only()
            .column(team_user::Column::Uid)
            .filter(team_user::Column::TeamId.eq(team_id))
            .into_tuple::<i64>()
            .all(&self.txn)
            .await
            .map_err(db_err)
    }

    async fn count_user_teams_in_org(&mut self, org_id: OrgId, user_id: UserId) -> Result<u64> {
        team_user::Entity::find()
            .filter(team_user::Column::OrgId.eq(org_id))
            .filter(team_user::Column::Uid.eq(user_id))
            .count(&self.txn)
            .await
            .map_err(db_err)
    }
}

// =============================================================================
// AccessStore / RepositoryStore Implementation
// =============================================================================

#[async_trait]
impl AccessStore for SeaOrmTransaction {
    async fn get_access(
        &mut self,
        user_id: UserId,
        repo_id: RepoId,
    ) -> Result<Option<AccessMode>> {
        let row = access::Entity::find()
            .filter(access::Column::UserId.eq(user_id))
            .filter(access::Column::RepoId.eq(repo_id))
            .one(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| AccessMode::from_level(r.mode)))
    }

    async fn list_repo_accesses(&mut self, repo_id: RepoId) -> Result<Vec<Access>> {
        let rows = access::Entity::find()
            .filter(access::Column::RepoId.eq(repo_id))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Access {
                user_id: r.user_id,
                repo_id: r.repo_id,
                mode: AccessMode::from_level(r.mode),
            })
            .collect())
    }

    async fn list_user_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<Vec<Access>> {
        if repo_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = access::Entity::find()
            .filter(access::Column::UserId.eq(user_id))
            .filter(access::Column::RepoId.is_in(repo_ids.iter().copied()))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Access {
                user_id: r.user_id,
                repo_id: r.repo_id,
                mode: AccessMode::from_level(r.mode),
            })
            .collect())
    }

    async fn upsert_access(&mut self, a: &Access) -> Result<()> {
        let model = access::ActiveModel {
            id: NotSet,
            user_id: Set(a.user_id),
            repo_id: Set(a.repo_id),
            mode: Set(a.mode.level()),
        };
        access::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([access::Column::UserId, access::Column::RepoId])
                    .update_column(access::Column::Mode)
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_access(&mut self, user_id: UserId, repo_id: RepoId) -> Result<()> {
        access::Entity::delete_many()
            .filter(access::Column::UserId.eq(user_id))
            .filter(access::Column::RepoId.eq(repo_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_accesses(&mut self, accesses: &[Access]) -> Result<()> {
        if accesses.is_empty() {
            return Ok(());
        }
        let models = accesses.iter().map(|a| access::ActiveModel {
            id: NotSet,
            user_id: Set(a.user_id),
            repo_id: Set(a.repo_id),
            mode: Set(a.mode.level()),
        });
        access::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([access::Column::UserId, access::Column::RepoId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn raise_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
        mode: AccessMode,
    ) -> Result<u64> {
        if repo_ids.is_empty() {
            return Ok(0);
        }
        let res = access::Entity::update_many()
            .col_expr(access::Column::Mode, Expr::value(mode.level()))
            .filter(access::Column::UserId.eq(user_id))
            .filter(access::Column::RepoId.is_in(repo_ids.iter().copied()))
            .filter(access::Column::Mode.lt(mode.level()))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected)
    }

    async fn list_collaborations(&mut self, repo_id: RepoId) -> Result<Vec<Collaboration>> {
        let rows = collaboration::Entity::find()
            .filter(collaboration::Column::RepoId.eq(repo_id))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Collaboration {
                repo_id: r.repo_id,
                user_id: r.user_id,
                mode: AccessMode::from_level(r.mode),
            })
            .collect())
    }

    async fn get_collaboration(
        &mut self,
        repo_id: RepoId,
        user_id: UserId,
    ) -> Result<Option<AccessMode>> {
        let row = collaboration::Entity::find()
            .filter(collaboration::Column::RepoId.eq(repo_id))
            .filter(collaboration::Column::UserId.eq(user_id))
            .one(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| AccessMode::from_level(r.mode)))
    }
}

#[async_trait]
impl RepositoryStore for SeaOrmTransaction {
    async fn list_by_owner(&mut self, org_id: OrgId) -> Result<Vec<Repository>> {
        let rows = repository::Entity::find()
            .filter(repository::Column::OwnerId.eq(org_id))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(model_to_repository).collect())
    }

    async fn get_by_id(&mut self, repo_id: RepoId) -> Result<Option<Repository>> {
        let row = repository::Entity::find_by_id(repo_id)
            .one(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(row.map(model_to_repository))
    }
}

impl AccessChecker for SeaOrmTransaction {}

// =============================================================================
// Collaborator Implementations
// =============================================================================

#[async_trait]
impl WatchService for SeaOrmTransaction {
    async fn set_watch(&mut self, user_id: UserId, repo_id: RepoId, watching: bool) -> Result<()> {
        if watching {
            insert_watch(&self.txn, user_id, repo_id).await?;
        } else {
            watch::Entity::delete_many()
                .filter(watch::Column::UserId.eq(user_id))
                .filter(watch::Column::RepoId.eq(repo_id))
                .exec(&self.txn)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn try_watch(&mut self, user_id: UserId, repo_id: RepoId) -> Result<()> {
        // A failed statement aborts the whole transaction on Postgres, so the
        // insert runs under a savepoint that alone is rolled back.
        let savepoint = self.txn.begin().await.map_err(db_err)?;
        match insert_watch(&savepoint, user_id, repo_id).await {
            Ok(()) => savepoint.commit().await.map_err(db_err),
            Err(e) => {
                savepoint.rollback().await.map_err(db_err)?;
                Err(e)
            }
        }
    }

    async fn is_watching(&mut self, user_id: UserId, repo_id: RepoId) -> Result<bool> {
        let count = watch::Entity::find()
            .filter(watch::Column::UserId.eq(user_id))
            .filter(watch::Column::RepoId.eq(repo_id))
            .count(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn remove_issue_watches(&mut self, user_id: UserId, repo_id: RepoId) -> Result<u64> {
        let issue_ids = self.issue_ids(repo_id).await?;
        if issue_ids.is_empty() {
            return Ok(0);
        }
        let res = issue_watch::Entity::delete_many()
            .filter(issue_watch::Column::UserId.eq(user_id))
            .filter(issue_watch::Column::IssueId.is_in(issue_ids))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl IssueAssignmentService for SeaOrmTransaction {
    async fn unassign_user_from_repo_issues(
        &mut self,
        user_id: UserId,
        repo_id: RepoId,
    ) -> Result<u64> {
        let issue_ids = self.issue_ids(repo_id).await?;
        if issue_ids.is_empty() {
            return Ok(0);
        }
        let res = issue_assignees::Entity::delete_many()
            .filter(issue_assignees::Column::AssigneeId.eq(user_id))
            .filter(issue_assignees::Column::IssueId.is_in(issue_ids))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl OrganizationStore for SeaOrmTransaction {
    async fn organization_exists(&mut self, org_id: OrgId) -> Result<bool> {
        let row = organization::Entity::find_by_id(org_id)
            .one(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn adjust_num_teams(&mut self, org_id: OrgId, delta: i64) -> Result<()> {
        organization::Entity::update_many()
            .col_expr(
                organization::Column::NumTeams,
                Expr::col(organization::Column::NumTeams).add(delta),
            )
            .filter(organization::Column::Id.eq(org_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl OrgMembershipService for SeaOrmTransaction {
    async fn add_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<()> {
        let model = org_user::ActiveModel {
            id: NotSet,
            uid: Set(user_id),
            org_id: Set(org_id),
        };
        org_user::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([org_user::Column::Uid, org_user::Column::OrgId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn remove_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<()> {
        org_user::Entity::delete_many()
            .filter(org_user::Column::OrgId.eq(org_id))
            .filter(org_user::Column::Uid.eq(user_id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn is_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<bool> {
        let count = org_user::Entity::find()
            .filter(org_user::Column::OrgId.eq(org_id))
            .filter(org_user::Column::Uid.eq(user_id))
            .count(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl BranchProtectionStore for SeaOrmTransaction {
    async fn find_by_owner(&mut self, org_id: OrgId) -> Result<Vec<ProtectedBranch>> {
        let repo_ids: Vec<RepoId> = repository::Entity::find()
            .select_only()
            .column(repository::Column::Id)
            .filter(repository::Column::OwnerId.eq(org_id))
            .into_tuple::<i64>()
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        if repo_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = protected_branch::Entity::find()
            .filter(protected_branch::Column::RepoId.is_in(repo_ids))
            .all(&self.txn)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(model_to_branch).collect()
    }

    async fn update_whitelists(&mut self, branch: &ProtectedBranch) -> Result<()> {
        let push = serde_json::to_string(&branch.push_whitelist_team_ids)?;
        let merge = serde_json::to_string(&branch.merge_whitelist_team_ids)?;
        let approvals = serde_json::to_string(&branch.approvals_whitelist_team_ids)?;
        protected_branch::Entity::update_many()
            .col_expr(protected_branch::Column::WhitelistTeamIds, Expr::value(push))
            .col_expr(
                protected_branch::Column::MergeWhitelistTeamIds,
                Expr::value(merge),
            )
            .col_expr(
                protected_branch::Column::ApprovalsWhitelistTeamIds,
                Expr::value(approvals),
            )
            .filter(protected_branch::Column::Id.eq(branch.id))
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl TeamTransaction for SeaOrmTransaction {
    async fn commit(self) -> Result<()> {
        self.txn.commit().await.map_err(db_err)
    }
}
