mod common;

use common::{Harness, ORG, assert_invariants};
use gatehouse::teams::{
    AccessMode, FailPoint, InMemoryAuditStore, MembershipOutcome, TeamAuditEvent, TeamAuditStore,
    TeamError, TeamMembershipManager, TeamsConfig,
};

#[tokio::test]
async fn test_add_member_grants_team_mode_and_joins_org() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.repo(2).await;
    let team = h.team("devs", AccessMode::Write).await;
    h.attach(team.id, 1).await;
    h.attach(team.id, 2).await;

    let outcome = h.members.add_member(&h.ctx, team.id, 7).await.unwrap();

    assert_eq!(outcome, MembershipOutcome::Added);
    assert!(h.store.org_member(ORG, 7).await);
    assert_eq!(h.store.access(7, 1).await, Some(AccessMode::Write));
    assert_eq!(h.store.access(7, 2).await, Some(AccessMode::Write));
    assert_eq!(h.store.team(team.id).await.unwrap().num_members, 1);
    assert!(h.members.is_member(&h.ctx, team.id, 7).await.unwrap());
    assert_eq!(h.members.list_members(&h.ctx, team.id).await.unwrap(), vec![7]);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_add_existing_member_is_noop() {
    let h = Harness::new().await;
    let team = h.team("devs", AccessMode::Read).await;
    h.add(team.id, 7).await;

    let outcome = h.members.add_member(&h.ctx, team.id, 7).await.unwrap();

    assert_eq!(outcome, MembershipOutcome::AlreadyMember);
    assert_eq!(h.store.team(team.id).await.unwrap().num_members, 1);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_add_member_to_missing_team() {
    let h = Harness::new().await;
    let err = h.members.add_member(&h.ctx, 404, 7).await.unwrap_err();
    assert!(matches!(err, TeamError::TeamNotFound { team_id: 404 }));
    assert!(!h.store.org_member(ORG, 7).await);
}

#[tokio::test]
async fn test_add_member_never_downgrades_direct_grant() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.store.add_collaboration(1, 7, AccessMode::Admin).await;
    let team = h.team("readers", AccessMode::Read).await;
    h.attach(team.id, 1).await;

    h.add(team.id, 7).await;

    assert_eq!(h.store.access(7, 1).await, Some(AccessMode::Admin));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_remove_member_drops_access_watches_and_assignments() {
    let h = Harness::new().await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Write).await;
    h.attach(team.id, 1).await;
    h.add(team.id, 7).await;
    h.add(team.id, 8).await;
    h.store.add_watch(7, 1).await;
    let issue = h.store.add_issue(1, &[7, 8]).await;
    h.store.add_issue_watch(7, issue).await;

    let outcome = h.members.remove_member(&h.ctx, team.id, 7).await.unwrap();

    assert_eq!(outcome, MembershipOutcome::Removed);
    assert_eq!(h.store.access(7, 1).await, None);
    assert!(!h.store.watching(7, 1).await);
    assert!(!h.store.watches_issue(7, issue).await);
    assert_eq!(h.store.issue_assignees(issue).await.into_iter().collect::<Vec<_>>(), vec![8]);
    assert!(!h.store.org_member(ORG, 7).await);
    assert_eq!(h.store.team(team.id).await.unwrap().num_members, 1);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_remove_member_keeps_access_from_other_team() {
    let h = Harness::new().await;
    h.repo(1).await;
    let writers = h.team("writers", AccessMode::Write).await;
    let readers = h.team("readers", AccessMode::Read).await;
    h.attach(writers.id, 1).await;
    h.attach(readers.id, 1).await;
    h.add(writers.id, 7).await;
    h.add(readers.id, 7).await;
    h.store.add_watch(7, 1).await;

    h.members.remove_member(&h.ctx, writers.id, 7).await.unwrap();

    assert_eq!(h.store.access(7, 1).await, Some(AccessMode::Read));
    assert!(h.store.watching(7, 1).await);
    assert!(h.store.org_member(ORG, 7).await);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_remove_non_member_is_noop() {
    let h = Harness::new().await;
    let team = h.team("devs", AccessMode::Read).await;

    let outcome = h.members.remove_member(&h.ctx, team.id, 7).await.unwrap();

    assert_eq!(outcome, MembershipOutcome::NotMember);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_last_owner_cannot_leave() {
    let h = Harness::new().await;
    h.repo(1).await;
    let owners = h.owners().await;
    h.add(owners.id, 1).await;

    let err = h.members.remove_member(&h.ctx, owners.id, 1).await.unwrap_err();
    assert!(matches!(err, TeamError::LastOwner { user_id: 1 }));
    assert!(h.members.is_member(&h.ctx, owners.id, 1).await.unwrap());
    assert_eq!(h.store.access(1, 1).await, Some(AccessMode::Owner));

    // With a second owner the first may leave.
    h.add(owners.id, 2).await;
    let outcome = h.members.remove_member(&h.ctx, owners.id, 1).await.unwrap();
    assert_eq!(outcome, MembershipOutcome::Removed);
    assert_eq!(h.store.access(1, 1).await, None);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_concurrent_adds_count_once() {
    let h = Harness::new().await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Read).await;
    h.attach(team.id, 1).await;

    let (a, b) = tokio::join!(
        h.members.add_member(&h.ctx, team.id, 7),
        h.members.add_member(&h.ctx, team.id, 7),
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == MembershipOutcome::AlreadyMember);

    assert_eq!(
        outcomes,
        vec![MembershipOutcome::Added, MembershipOutcome::AlreadyMember]
    );
    assert_eq!(h.store.team(team.id).await.unwrap().num_members, 1);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_add_member_losing_insert_race_reports_already_member() {
    let h = Harness::new().await;
    h.repo(1).await;
    let team = h.team("devs", AccessMode::Read).await;
    h.attach(team.id, 1).await;

    h.store.inject_failure(FailPoint::TeamUserConflict).await;
    let outcome = h.members.add_member(&h.ctx, team.id, 7).await;
    h.store.clear_failure().await;

    assert_eq!(outcome.unwrap(), MembershipOutcome::AlreadyMember);
    assert_eq!(h.store.team(team.id).await.unwrap().num_members, 0);
    assert!(!h.store.org_member(ORG, 7).await);
    assert_eq!(h.store.access(7, 1).await, None);
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_membership_audit_entries() {
    let h = Harness::new().await;
    let team = h.team("devs", AccessMode::Read).await;
    let audit = InMemoryAuditStore::new();
    let members = TeamMembershipManager::new(h.store.clone(), TeamsConfig::default())
        .with_audit_store(audit.clone());

    members.add_member(&h.ctx, team.id, 7).await.unwrap();
    members.add_member(&h.ctx, team.id, 7).await.unwrap();
    members.remove_member(&h.ctx, team.id, 7).await.unwrap();
    members.remove_member(&h.ctx, team.id, 7).await.unwrap();

    let log = audit.get_org_audit_log(ORG, 10).await.unwrap();
    let events: Vec<_> = log.iter().map(|e| (e.event, e.target_id)).collect();
    assert_eq!(
        events,
        vec![
            (TeamAuditEvent::MemberRemoved, Some(7)),
            (TeamAuditEvent::MemberAdded, Some(7)),
        ]
    );
}
