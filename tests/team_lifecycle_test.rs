mod common;

use common::{Harness, ORG, assert_invariants};
use gatehouse::teams::{
    AccessMode, DetachMode, InMemoryAuditStore, LinkOutcome, ProtectedBranch, Repository,
    TeamAuditEvent, TeamAuditStore, TeamCreateParams, TeamError, TeamManager, TeamUpdateParams,
    TeamsConfig, UnitType,
};

#[tokio::test]
async fn test_create_team_increments_org_counter() {
    let h = Harness::new().await;

    let team = h
        .teams
        .create_team(
            &h.ctx,
            TeamCreateParams::new(ORG, "Backend")
                .description("server side")
                .access_mode(AccessMode::Write)
                .unit(UnitType::Code, AccessMode::Write)
                .unit(UnitType::Issues, AccessMode::Read),
        )
        .await
        .unwrap();

    assert_eq!(team.lower_name, "backend");
    assert_eq!(team.num_repos, 0);
    assert_eq!(team.units.len(), 2);
    assert_eq!(team.unit_access_mode(UnitType::Issues), AccessMode::Read);
    assert_eq!(team.unit_access_mode(UnitType::Wiki), AccessMode::Write);
    assert_eq!(h.store.num_teams(ORG).await, Some(1));

    let found = h
        .teams
        .find_team_by_name(&h.ctx, ORG, "BACKEND")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, team.id);
    assert_eq!(found.units.len(), 2);
}

#[tokio::test]
async fn test_create_team_rejects_bad_names() {
    let h = Harness::new().await;

    let err = h
        .teams
        .create_team(&h.ctx, TeamCreateParams::new(ORG, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::EmptyName));
    assert!(err.is_validation());

    let err = h
        .teams
        .create_team(&h.ctx, TeamCreateParams::new(ORG, "no spaces"))
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::InvalidName { .. }));

    h.team("devs", AccessMode::Read).await;
    let err = h
        .teams
        .create_team(&h.ctx, TeamCreateParams::new(ORG, "DEVS"))
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::TeamAlreadyExists { org_id: ORG, .. }));

    assert_eq!(h.store.num_teams(ORG).await, Some(1));
}

#[tokio::test]
async fn test_create_team_in_unknown_org() {
    let h = Harness::new().await;
    let err = h
        .teams
        .create_team(&h.ctx, TeamCreateParams::new(999, "devs"))
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::OrganizationNotFound { org_id: 999 }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_description_is_truncated() {
    let h = Harness::with_config(TeamsConfig::default().max_description_length(5)).await;
    let team = h
        .teams
        .create_team(
            &h.ctx,
            TeamCreateParams::new(ORG, "devs").description("abcdefghij"),
        )
        .await
        .unwrap();
    assert_eq!(team.description, "abcde");
}

#[tokio::test]
async fn test_update_rename_and_collision() {
    let h = Harness::new().await;
    let devs = h.team("devs", AccessMode::Read).await;
    h.team("ops", AccessMode::Read).await;

    let err = h
        .teams
        .update_team(&h.ctx, TeamUpdateParams::from_team(&devs).name("Ops"))
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::TeamAlreadyExists { .. }));

    // Changing only the case of its own name is fine.
    let renamed = h
        .teams
        .update_team(&h.ctx, TeamUpdateParams::from_team(&devs).name("Devs"))
        .await
        .unwrap();
    assert_eq!(renamed.name, "Devs");
    assert_eq!(renamed.lower_name, "devs");
}

#[tokio::test]
async fn test_update_access_mode_recomputes_projection() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.repo(2).await;
    let team = h.team("devs", AccessMode::Read).await;
    h.attach(team.id, 1).await;
    h.attach(team.id, 2).await;
    h.add(team.id, 7).await;
    assert_eq!(h.store.access(7, 1).await, Some(AccessMode::Read));

    let team = h.teams.get_team(&h.ctx, team.id).await.unwrap();
    h.teams
        .update_team(
            &h.ctx,
            TeamUpdateParams::from_team(&team).access_mode(AccessMode::Admin),
        )
        .await
        .unwrap();

    assert_eq!(h.store.access(7, 1).await, Some(AccessMode::Admin));
    assert_eq!(h.store.access(7, 2).await, Some(AccessMode::Admin));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_lowering_access_to_none_reconciles_members() {
    let h = Harness::new().await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Write).await;
    h.attach(team.id, 1).await;
    h.add(team.id, 7).await;
    h.store.add_watch(7, 1).await;
    let issue = h.store.add_issue(1, &[7]).await;

    let team = h.teams.get_team(&h.ctx, team.id).await.unwrap();
    h.teams
        .update_team(
            &h.ctx,
            TeamUpdateParams::from_team(&team).access_mode(AccessMode::None),
        )
        .await
        .unwrap();

    assert_eq!(h.store.access(7, 1).await, None);
    assert!(!h.store.watching(7, 1).await);
    assert!(h.store.issue_assignees(issue).await.is_empty());
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_owner_team_rejects_rename_and_mode_change() {
    let h = Harness::new().await;
    let owners = h.owners().await;

    for params in [
        TeamUpdateParams::from_team(&owners).name("admins"),
        TeamUpdateParams::from_team(&owners).access_mode(AccessMode::Read),
    ] {
        let err = h.teams.update_team(&h.ctx, params).await.unwrap_err();
        assert!(matches!(err, TeamError::OwnerTeamImmutable { team_id } if team_id == owners.id));
    }
    let stored = h.store.team(owners.id).await.unwrap();
    assert_eq!(stored.lower_name, "owners");
    assert_eq!(stored.effective_mode(), AccessMode::Owner);

    let updated = h
        .teams
        .update_team(
            &h.ctx,
            TeamUpdateParams::from_team(&owners).description("the owners"),
        )
        .await
        .unwrap();
    assert_eq!(updated.description, "the owners");
    assert_eq!(updated.effective_mode(), AccessMode::Owner);
}

#[tokio::test]
async fn test_includes_all_newly_set_attaches_everything() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.repo(2).await;
    let team = h.team("devs", AccessMode::Read).await;
    h.add(team.id, 7).await;

    let team = h.teams.get_team(&h.ctx, team.id).await.unwrap();
    let updated = h
        .teams
        .update_team(
            &h.ctx,
            TeamUpdateParams::from_team(&team).includes_all_repositories(true),
        )
        .await
        .unwrap();

    assert_eq!(updated.num_repos, 2);
    assert!(h.teams.has_repository(&h.ctx, team.id, 1).await.unwrap());
    assert!(h.teams.has_repository(&h.ctx, team.id, 2).await.unwrap());
    assert_eq!(h.store.access(7, 2).await, Some(AccessMode::Read));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_units_replaced_only_when_given() {
    let h = Harness::new().await;
    let team = h
        .teams
        .create_team(
            &h.ctx,
            TeamCreateParams::new(ORG, "devs").unit(UnitType::Code, AccessMode::Write),
        )
        .await
        .unwrap();

    let kept = h
        .teams
        .update_team(&h.ctx, TeamUpdateParams::from_team(&team).description("x"))
        .await
        .unwrap();
    assert_eq!(kept.units.len(), 1);

    let replaced = h
        .teams
        .update_team(
            &h.ctx,
            TeamUpdateParams::from_team(&team).unit(UnitType::Wiki, AccessMode::Read),
        )
        .await
        .unwrap();
    assert_eq!(replaced.units.len(), 1);
    assert_eq!(replaced.units[0].unit_type, UnitType::Wiki);
}

#[tokio::test]
async fn test_delete_team_cleans_up_everything() {
    let h = Harness::new().await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Write).await;
    let other = h.team("ops", AccessMode::Read).await;
    h.attach(team.id, 1).await;
    h.add(team.id, 7).await;
    h.add(team.id, 8).await;
    h.add(other.id, 8).await;
    h.store.add_watch(7, 1).await;
    h.store
        .add_protected_branch(ProtectedBranch {
            id: 1,
            repo_id: 1,
            branch_name: "main".to_string(),
            push_whitelist_team_ids: vec![team.id, other.id],
            merge_whitelist_team_ids: vec![team.id],
            approvals_whitelist_team_ids: vec![],
        })
        .await;

    h.teams.delete_team(&h.ctx, team.id).await.unwrap();

    let state = h.store.snapshot().await;
    assert!(!state.teams.contains_key(&team.id));
    assert!(state.team_users.keys().all(|(t, _)| *t != team.id));
    assert!(state.team_repos.keys().all(|(t, _)| *t != team.id));
    assert_eq!(h.store.num_teams(ORG).await, Some(1));

    assert_eq!(h.store.access(7, 1).await, None);
    assert!(!h.store.watching(7, 1).await);

    // User 7 was only in the deleted team; user 8 stays through "ops".
    assert!(!h.store.org_member(ORG, 7).await);
    assert!(h.store.org_member(ORG, 8).await);

    let branch = h.store.protected_branch(1).await.unwrap();
    assert_eq!(branch.push_whitelist_team_ids, vec![other.id]);
    assert!(branch.merge_whitelist_team_ids.is_empty());
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_delete_includes_all_team_still_recomputes() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.repo(2).await;
    let team = h
        .teams
        .create_team(
            &h.ctx,
            TeamCreateParams::new(ORG, "everyone")
                .access_mode(AccessMode::Read)
                .includes_all_repositories(true),
        )
        .await
        .unwrap();
    h.add(team.id, 7).await;
    assert_eq!(h.store.access(7, 2).await, Some(AccessMode::Read));

    h.teams.delete_team(&h.ctx, team.id).await.unwrap();

    assert_eq!(h.store.access(7, 1).await, None);
    assert_eq!(h.store.access(7, 2).await, None);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_delete_missing_team() {
    let h = Harness::new().await;
    let err = h.teams.delete_team(&h.ctx, 42).await.unwrap_err();
    assert!(matches!(err, TeamError::TeamNotFound { team_id: 42 }));
}

#[tokio::test]
async fn test_attach_and_detach_are_idempotent() {
    let h = Harness::new().await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Read).await;

    let first = h.teams.attach_repository(&h.ctx, team.id, 1).await.unwrap();
    let second = h.teams.attach_repository(&h.ctx, team.id, 1).await.unwrap();
    assert_eq!(first, LinkOutcome::Attached);
    assert_eq!(second, LinkOutcome::AlreadyAttached);

    let first = h
        .teams
        .detach_repository(&h.ctx, team.id, 1, DetachMode::new())
        .await
        .unwrap();
    let second = h
        .teams
        .detach_repository(&h.ctx, team.id, 1, DetachMode::new())
        .await
        .unwrap();
    assert_eq!(first, LinkOutcome::Detached);
    assert_eq!(second, LinkOutcome::NotAttached);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_attach_rejects_other_org_and_missing_repo() {
    let h = Harness::new().await;
    h.store
        .add_repository(Repository::new(5, 200, "foreign", true))
        .await;
    let team = h.team("devs", AccessMode::Read).await;

    let err = h.teams.attach_repository(&h.ctx, team.id, 5).await.unwrap_err();
    assert!(matches!(err, TeamError::RepositoryNotInOrganization { repo_id: 5, org_id: ORG }));

    let err = h.teams.attach_repository(&h.ctx, team.id, 6).await.unwrap_err();
    assert!(matches!(err, TeamError::RepositoryNotFound { repo_id: 6 }));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_detach_from_includes_all_team() {
    let h = Harness::new().await;
    h.repo(1).await;
    let owners = h.owners().await;

    let err = h
        .teams
        .detach_repository(&h.ctx, owners.id, 1, DetachMode::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::IncludesAllRepositories { .. }));
    assert!(h.teams.has_repository(&h.ctx, owners.id, 1).await.unwrap());

    assert_eq!(
        h.teams
            .detach_all_repositories(&h.ctx, owners.id)
            .await
            .unwrap(),
        0
    );

    let outcome = h
        .teams
        .detach_repository(&h.ctx, owners.id, 1, DetachMode::new().force(true))
        .await
        .unwrap();
    assert_eq!(outcome, LinkOutcome::Detached);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_attach_all_then_detach_all() {
    let h = Harness::new().await;
    for id in 1..=4 {
        h.repo(id).await;
    }
    let team = h.team("devs", AccessMode::Write).await;
    h.attach(team.id, 2).await;
    h.add(team.id, 7).await;

    assert_eq!(h.teams.attach_all_repositories(&h.ctx, team.id).await.unwrap(), 3);
    assert_eq!(h.teams.list_repositories(&h.ctx, team.id).await.unwrap().len(), 4);
    assert_invariants(&h.store).await;

    assert_eq!(h.teams.detach_all_repositories(&h.ctx, team.id).await.unwrap(), 4);
    assert!(h.teams.list_repositories(&h.ctx, team.id).await.unwrap().is_empty());
    assert_eq!(h.store.access(7, 3).await, None);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_access_rows_inserted_in_batches() {
    let h = Harness::with_config(TeamsConfig::default().access_batch_size(2)).await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Read).await;
    for user_id in 1..=5 {
        h.add(team.id, user_id).await;
    }

    let before = h.store.snapshot().await.access_insert_batches;
    h.attach(team.id, 1).await;
    let after = h.store.snapshot().await.access_insert_batches;

    assert_eq!(after - before, 3);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_audit_entries_follow_commits() {
    let store = gatehouse::teams::InMemoryTeamStore::new();
    store.add_organization(ORG).await;
    store.add_repository(Repository::new(1, ORG, "api", true)).await;
    let audit = InMemoryAuditStore::new();
    let teams = TeamManager::new(store.clone(), TeamsConfig::default()).with_audit_store(audit.clone());
    let ctx = gatehouse::teams::OpContext::new().with_actor(9);

    let team = teams
        .create_team(&ctx, TeamCreateParams::new(ORG, "devs"))
        .await
        .unwrap();
    teams.attach_repository(&ctx, team.id, 1).await.unwrap();
    // No-op and failing calls leave no entry.
    teams.attach_repository(&ctx, team.id, 1).await.unwrap();
    assert!(teams.create_team(&ctx, TeamCreateParams::new(ORG, "devs")).await.is_err());
    teams.delete_team(&ctx, team.id).await.unwrap();

    let log = audit.get_team_audit_log(team.id, 10).await.unwrap();
    let events: Vec<_> = log.iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        vec![
            TeamAuditEvent::TeamDeleted,
            TeamAuditEvent::RepositoryAttached,
            TeamAuditEvent::TeamCreated,
        ]
    );
    assert!(log.iter().all(|e| e.actor_id == Some(9)));
    assert_eq!(log[1].target_id, Some(1));
}
