mod common;

use common::{Harness, ORG, assert_invariants};
use gatehouse::teams::{AccessMode, DetachMode, TeamCreateParams};

#[tokio::test]
async fn test_detaching_team_leaves_owner_access_untouched() {
    let h = Harness::new().await;
    h.repo(1).await;
    let owners = h.owners().await;
    h.add(owners.id, 1).await;
    let writers = h.team("writers", AccessMode::Write).await;
    h.add(writers.id, 2).await;
    h.attach(writers.id, 1).await;
    h.store.add_watch(2, 1).await;
    h.store.add_watch(1, 1).await;
    let issue = h.store.add_issue(1, &[1, 2]).await;

    h.teams
        .detach_repository(&h.ctx, writers.id, 1, DetachMode::new())
        .await
        .unwrap();

    assert_eq!(h.store.access(2, 1).await, None);
    assert!(!h.store.watching(2, 1).await);
    assert!(!h.store.issue_assignees(issue).await.contains(&2));

    assert_eq!(h.store.access(1, 1).await, Some(AccessMode::Owner));
    assert!(h.store.watching(1, 1).await);
    assert!(h.store.issue_assignees(issue).await.contains(&1));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_create_includes_all_team_attaches_every_repo() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.repo(2).await;

    let team = h
        .teams
        .create_team(
            &h.ctx,
            TeamCreateParams::new(ORG, "everyone")
                .access_mode(AccessMode::Write)
                .includes_all_repositories(true),
        )
        .await
        .unwrap();
    assert_eq!(team.num_repos, 2);
    assert!(h.teams.has_repository(&h.ctx, team.id, 1).await.unwrap());
    assert!(h.teams.has_repository(&h.ctx, team.id, 2).await.unwrap());

    h.add(team.id, 7).await;
    h.add(team.id, 8).await;
    for user_id in [7, 8] {
        for repo_id in [1, 2] {
            assert_eq!(h.store.access(user_id, repo_id).await, Some(AccessMode::Write));
        }
    }
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_joining_weaker_team_keeps_stronger_access() {
    let h = Harness::new().await;
    h.repo(1).await;
    let writers = h.team("writers", AccessMode::Write).await;
    let readers = h.team("readers", AccessMode::Read).await;
    h.attach(writers.id, 1).await;
    h.attach(readers.id, 1).await;
    h.add(writers.id, 7).await;

    h.add(readers.id, 7).await;

    assert_eq!(h.store.access(7, 1).await, Some(AccessMode::Write));
    assert_invariants(&h.store).await;
}

#[tokio::test]
async fn test_detach_then_reattach_restores_projection() {
    let h = Harness::new().await;
    h.repo(1).await;
    h.repo(2).await;
    h.store.add_collaboration(1, 9, AccessMode::Read).await;
    let writers = h.team("writers", AccessMode::Write).await;
    let readers = h.team("readers", AccessMode::Read).await;
    for repo_id in [1, 2] {
        h.attach(writers.id, repo_id).await;
        h.attach(readers.id, repo_id).await;
    }
    h.add(writers.id, 7).await;
    h.add(readers.id, 7).await;
    h.add(readers.id, 8).await;
    h.add(writers.id, 9).await;

    let before = h.store.snapshot().await.accesses;

    h.teams
        .detach_repository(&h.ctx, writers.id, 1, DetachMode::new())
        .await
        .unwrap();
    assert_ne!(h.store.snapshot().await.accesses, before);
    h.attach(writers.id, 1).await;

    assert_eq!(h.store.snapshot().await.accesses, before);
    assert_invariants(&h.store).await;
}

/// Small deterministic generator for mutation sequences.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) % bound
    }
}

#[tokio::test]
async fn test_random_mutation_sequences_keep_invariants() {
    for seed in 1..=5u64 {
        let h = Harness::new().await;
        for repo_id in 1..=4 {
            h.repo(repo_id).await;
        }
        h.store.add_collaboration(2, 3, AccessMode::Write).await;

        let owners = h.owners().await;
        h.add(owners.id, 1).await;
        let modes = [AccessMode::Read, AccessMode::Write, AccessMode::Admin];
        let mut team_ids = vec![owners.id];
        for (i, mode) in modes.into_iter().enumerate() {
            team_ids.push(h.team(&format!("team-{i}"), mode).await.id);
        }

        let mut rng = Lcg(seed);
        for _ in 0..60 {
            let team_id = team_ids[rng.next(team_ids.len() as u64) as usize];
            let repo_id = rng.next(4) as i64 + 1;
            let user_id = rng.next(5) as i64 + 1;
            // Errors such as the last-owner check are valid outcomes here.
            match rng.next(5) {
                0 => drop(h.teams.attach_repository(&h.ctx, team_id, repo_id).await),
                1 => drop(
                    h.teams
                        .detach_repository(&h.ctx, team_id, repo_id, DetachMode::new())
                        .await,
                ),
                2 | 3 => drop(h.members.add_member(&h.ctx, team_id, user_id).await),
                _ => drop(h.members.remove_member(&h.ctx, team_id, user_id).await),
            }
            assert_invariants(&h.store).await;
        }

        // The owner team never becomes empty.
        assert!(h.store.team(owners.id).await.unwrap().num_members >= 1);
    }
}
