mod helpers;

use helpers::*;
use invite_tracker::error::PlatformError;
use invite_tracker::models::*;
use invite_tracker::repositories::AttributionStore;
use invite_tracker::services::{InviteIssuer, JoinResolution};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const MEMBER: UserId = UserId::new(500);

// ============================================================================
// Snapshot refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let test = TestTracker::new();
    test.platform.set_invites(GUILD, vec![invite("a1", 1, 0), invite("b1", 2, 4)]);

    assert!(test.tracker.snapshots().refresh(GUILD).await);
    let first = test.tracker.snapshots().get(GUILD).await.unwrap();
    assert!(test.tracker.snapshots().refresh(GUILD).await);
    let second = test.tracker.snapshots().get(GUILD).await.unwrap();

    assert_eq!(*first, *second);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    test.platform.set_invites(GUILD, vec![]);

    for error in [
        PlatformError::transient("rate limited"),
        PlatformError::Permission("Missing Permissions".into()),
        PlatformError::Unavailable("Unknown Guild".into()),
    ] {
        test.platform.fail_next(GUILD, error);
        assert!(!test.tracker.snapshots().refresh(GUILD).await);
        assert_eq!(test.cached_codes().await, vec!["a1"]);
    }
}

#[tokio::test]
async fn test_exists_distinguishes_empty_from_unknown() {
    let test = TestTracker::seeded(vec![]).await;

    assert!(test.tracker.snapshots().exists(GUILD).await);
    assert!(test.tracker.snapshots().get(GUILD).await.unwrap().is_empty());
    assert!(!test.tracker.snapshots().exists(GuildId::new(2)).await);
}

#[tokio::test]
async fn test_unavailable_guild_is_skipped_until_it_returns() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    let fetches = test.platform.fetch_count();

    test.tracker.on_guild_unavailable(GUILD).await;
    test.platform.set_invites(GUILD, vec![invite("b1", 2, 0)]);
    assert!(!test.tracker.snapshots().refresh(GUILD).await);
    assert_eq!(test.platform.fetch_count(), fetches);
    assert_eq!(test.cached_codes().await, vec!["a1"]);

    test.tracker.on_guild_available(GUILD).await;
    assert_eq!(test.cached_codes().await, vec!["b1"]);
}

#[tokio::test]
async fn test_removed_guild_is_forgotten() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;

    test.tracker.on_guild_removed(GUILD).await;

    assert!(!test.tracker.snapshots().exists(GUILD).await);
    assert_eq!(test.tracker.resolve_join(GUILD, MEMBER).await, Inviter::Unknown);
}

#[tokio::test]
async fn test_invite_created_refreshes_immediately() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    let created = invite("n1", 2, 0);
    test.platform.set_invites(GUILD, vec![invite("a1", 1, 0), created.clone()]);

    test.tracker.on_invite_created(&created).await;

    assert_eq!(test.cached_codes().await, vec!["a1", "n1"]);
}

// ============================================================================
// Join resolution
// ============================================================================

#[tokio::test]
async fn test_join_through_consumed_invite() {
    let test = TestTracker::seeded(vec![limited_invite("a1", 1, 0, 1), invite("b1", 2, 0)]).await;
    test.platform.use_invite(GUILD, "a1");

    let inviter = test.tracker.resolve_join(GUILD, MEMBER).await;

    assert_eq!(inviter, Inviter::User(UserId::new(1)));
    assert_eq!(test.cached_codes().await, vec!["b1"]);
}

#[tokio::test]
async fn test_join_through_use_count() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 2), invite("b1", 2, 7)]).await;
    test.platform.use_invite(GUILD, "b1");

    let resolution = test.tracker.resolve_join_detailed(GUILD, MEMBER).await;

    assert_eq!(resolution.inviter, Inviter::User(UserId::new(2)));
    assert_eq!(resolution.after.unwrap().get("b1").unwrap().uses, 8);
    assert_eq!(
        test.tracker.snapshots().get(GUILD).await.unwrap().get("b1").unwrap().uses,
        8
    );
}

#[tokio::test]
async fn test_join_without_evidence_is_unknown() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 2)]).await;

    assert_eq!(test.tracker.resolve_join(GUILD, MEMBER).await, Inviter::Unknown);
}

#[tokio::test]
async fn test_join_in_uncached_guild_skips_fetch() {
    let test = TestTracker::new();
    test.platform.set_invites(GUILD, vec![invite("a1", 1, 0)]);

    let resolution = test.tracker.resolve_join_detailed(GUILD, MEMBER).await;

    assert_eq!(resolution.inviter, Inviter::Unknown);
    assert!(resolution.before.is_none());
    assert_eq!(test.platform.fetch_count(), 0);
    assert!(!test.tracker.snapshots().exists(GUILD).await);
}

#[tokio::test]
async fn test_join_in_guild_with_empty_snapshot_still_resolves() {
    let test = TestTracker::seeded(vec![]).await;
    test.platform.set_invites(GUILD, vec![invite("a1", 1, 0)]);

    let resolution = test.tracker.resolve_join_detailed(GUILD, MEMBER).await;

    assert_eq!(resolution.inviter, Inviter::Unknown);
    assert!(resolution.after.is_some());
    assert_eq!(test.cached_codes().await, vec!["a1"]);
}

#[tokio::test]
async fn test_join_with_failed_fetch_degrades_to_unknown() {
    let test = TestTracker::seeded(vec![limited_invite("a1", 1, 0, 1)]).await;
    test.platform.use_invite(GUILD, "a1");
    test.platform.fail_next(GUILD, PlatformError::transient("502 Bad Gateway"));

    let resolution = test.tracker.resolve_join_detailed(GUILD, MEMBER).await;

    assert_eq!(resolution.inviter, Inviter::Unknown);
    assert!(resolution.after.is_none());
    assert_eq!(test.cached_codes().await, vec!["a1"]);

    // The stale snapshot still holds the evidence for the next join.
    assert_eq!(
        test.tracker.resolve_join(GUILD, UserId::new(501)).await,
        Inviter::User(UserId::new(1))
    );
}

#[tokio::test]
async fn test_bot_authored_invite_credits_requester_once() {
    let test = TestTracker::seeded(vec![invite("b1", 2, 0)]).await;
    let issuer = InviteIssuer::new(test.platform.clone(), test.attributions.clone());

    let issued = issuer.issue_invite(CHANNEL, UserId::new(3)).await.unwrap();
    assert_eq!(issued.inviter_id, Some(BOT));
    assert_eq!(issued.max_uses, Some(1));
    assert_eq!(issued.max_age, Some(Duration::from_secs(86_400)));
    test.tracker.on_invite_created(&issued).await;

    test.platform.use_invite(GUILD, &issued.code);
    let inviter = test.tracker.resolve_join(GUILD, MEMBER).await;

    assert_eq!(inviter, Inviter::User(UserId::new(3)));
    assert!(test.attributions.get(&issued.code).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bot_authored_invite_without_record_is_unknown() {
    let test = TestTracker::seeded(vec![limited_invite("x1", BOT.get(), 0, 1)]).await;
    test.platform.use_invite(GUILD, "x1");

    assert_eq!(test.tracker.resolve_join(GUILD, MEMBER).await, Inviter::Unknown);
}

#[tokio::test]
async fn test_issue_invite_in_inaccessible_channel_records_nothing() {
    let test = TestTracker::new();
    let issuer = InviteIssuer::new(test.platform.clone(), test.attributions.clone());

    let result = issuer.issue_invite(ChannelId::new(99), UserId::new(3)).await;

    assert!(result.is_err());
    assert_eq!(test.attributions.len().await, 0);
}

// ============================================================================
// Ordering and races
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_joins_in_one_guild_are_serialized() {
    let s0 = vec![invite("a1", 1, 0), invite("b1", 2, 0)];
    let s1 = vec![invite("a1", 1, 1), invite("b1", 2, 0)];
    let s2 = vec![invite("a1", 1, 1), invite("b1", 2, 1)];

    let test = TestTracker::seeded(s0.clone()).await;
    test.platform.set_fetch_delay(Duration::from_millis(300));
    test.platform.push_response(GUILD, Ok(s1));
    test.platform.push_response(GUILD, Ok(s2));

    let first = {
        let tracker = test.tracker.clone();
        tokio::spawn(async move { tracker.resolve_join_detailed(GUILD, UserId::new(501)).await })
    };
    let second = {
        let tracker = test.tracker.clone();
        tokio::spawn(async move { tracker.resolve_join_detailed(GUILD, UserId::new(502)).await })
    };

    let a: JoinResolution = first.await.unwrap();
    let b: JoinResolution = second.await.unwrap();

    let seeded = GroupInviteSnapshot::new(s0);
    let (earlier, later) = if *a.before.as_ref().unwrap().as_ref() == seeded {
        (a, b)
    } else {
        (b, a)
    };

    assert_eq!(later.before, earlier.after);
    assert_eq!(test.platform.max_concurrent_fetches(), 1);

    let mut credited = vec![earlier.inviter, later.inviter];
    credited.sort_by_key(|i| i.user_id());
    assert_eq!(credited, vec![Inviter::User(UserId::new(1)), Inviter::User(UserId::new(2))]);
}

#[tokio::test(start_paused = true)]
async fn test_joins_in_different_guilds_run_in_parallel() {
    let test = TestTracker::new();
    let other = GuildId::new(2);
    test.platform.set_invites(GUILD, vec![invite("a1", 1, 0)]);
    test.platform.set_invites(other, vec![]);
    test.tracker.warm([GUILD, other]).await;
    test.platform.set_fetch_delay(Duration::from_millis(500));

    let start = tokio::time::Instant::now();
    let (a, b) = tokio::join!(
        test.tracker.resolve_join(GUILD, UserId::new(501)),
        test.tracker.resolve_join(other, UserId::new(502)),
    );

    assert_eq!(a, Inviter::Unknown);
    assert_eq!(b, Inviter::Unknown);
    assert_eq!(test.platform.max_concurrent_fetches(), 2);
    assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_join_after_delete_notification_still_sees_consumed_invite() {
    let test = TestTracker::seeded(vec![limited_invite("a1", 1, 0, 1), invite("b1", 2, 0)]).await;

    // The platform reports the deletion before the join it caused.
    test.platform.use_invite(GUILD, "a1");
    test.tracker.on_invite_deleted(&deleted("a1"));
    sleep(Duration::from_millis(200)).await;

    assert!(test.tracker.scheduler().is_pending(GUILD));
    assert_eq!(test.cached_codes().await, vec!["a1", "b1"]);

    let resolution = test.tracker.resolve_join_detailed(GUILD, MEMBER).await;
    assert!(resolution.before.unwrap().contains("a1"));
    assert_eq!(resolution.inviter, Inviter::User(UserId::new(1)));

    sleep(Duration::from_secs(2)).await;
    assert!(!test.tracker.scheduler().is_pending(GUILD));
    assert_eq!(test.cached_codes().await, vec!["b1"]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_before_join_loses_evidence() {
    let test = TestTracker::seeded(vec![limited_invite("a1", 1, 0, 1), invite("b1", 2, 0)]).await;

    test.platform.use_invite(GUILD, "a1");
    test.tracker.on_invite_deleted(&deleted("a1"));
    sleep(Duration::from_secs(2)).await;

    assert_eq!(test.tracker.resolve_join(GUILD, MEMBER).await, Inviter::Unknown);
}

#[tokio::test(start_paused = true)]
async fn test_each_deletion_refreshes_after_its_own_delay() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0), invite("b1", 2, 0)]).await;
    let fetches = test.platform.fetch_count();

    test.tracker.on_invite_deleted(&deleted("a1"));
    sleep(Duration::from_millis(800)).await;
    test.tracker.on_invite_deleted(&deleted("b1"));
    sleep(Duration::from_millis(400)).await;

    assert_eq!(test.platform.fetch_count(), fetches + 1);
    assert!(test.tracker.scheduler().is_pending(GUILD));

    sleep(Duration::from_millis(700)).await;
    assert_eq!(test.platform.fetch_count(), fetches + 2);
    assert_eq!(test.tracker.scheduler().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_steady_deletions_do_not_postpone_refresh() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    let fetches = test.platform.fetch_count();
    test.platform.set_invites(GUILD, vec![invite("b1", 2, 0)]);

    for _ in 0..10 {
        test.tracker.on_invite_deleted(&deleted("a1"));
        sleep(Duration::from_millis(900)).await;
    }

    // Deletions at 0..=7200ms have come due by 9000ms.
    assert_eq!(test.platform.fetch_count(), fetches + 9);
    assert_eq!(test.cached_codes().await, vec!["b1"]);
}

#[tokio::test(start_paused = true)]
async fn test_guild_removed_during_join_stays_forgotten() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    test.platform.set_fetch_delay(Duration::from_millis(500));

    let join = {
        let tracker = test.tracker.clone();
        tokio::spawn(async move { tracker.resolve_join_detailed(GUILD, MEMBER).await })
    };
    sleep(Duration::from_millis(100)).await;

    test.tracker.on_guild_removed(GUILD).await;
    assert!(!test.tracker.snapshots().exists(GUILD).await);

    let resolution = join.await.unwrap();
    assert!(resolution.after.is_some());
    assert!(!test.tracker.snapshots().exists(GUILD).await);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_pending_refreshes() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    let fetches = test.platform.fetch_count();

    test.tracker.on_invite_deleted(&deleted("a1"));
    test.tracker.shutdown();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(test.platform.fetch_count(), fetches);
    assert_eq!(test.tracker.scheduler().pending_count(), 0);
}

#[tokio::test]
async fn test_tracker_is_shareable_across_tasks() {
    let test = TestTracker::seeded(vec![invite("a1", 1, 0)]).await;
    let tracker = Arc::clone(&test.tracker);

    let handle = tokio::spawn(async move { tracker.resolve_join(GUILD, MEMBER).await });

    tokio_test::assert_ok!(handle.await);
}
