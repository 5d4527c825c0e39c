//! Queue lifecycle tests: joins, pulls, kicks, shuffles, grace and restarts.

mod common;

use common::{Setup, TestEngine, eventually};
use lineup::db::{MemberState, QueueKind};
use lineup::dispatch::{Intent, Outcome, PlatformEvent, QueueOptions};
use lineup::error::QueueError;
use lineup::state::Notice;
use lineup::state::actor::QueueSetting;
use std::collections::HashMap;
use std::time::Duration;

const TEXT: i64 = 100;
const VOICE: i64 = 200;

async fn text_queue(options: QueueOptions) -> TestEngine {
    let t = TestEngine::start().await;
    t.create(TEXT, QueueKind::Text, options).await;
    t
}

async fn join_all(t: &TestEngine, queue: i64, members: &[i64]) {
    for &member in members {
        t.join(queue, member).await.unwrap();
    }
}

#[tokio::test]
async fn priority_members_wait_ahead_of_everyone() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11]).await;
    t.send(Intent::Join {
        queue: TEXT,
        member: 12,
        priority: true,
    })
    .await
    .unwrap();
    t.join(TEXT, 13).await.unwrap();

    assert_eq!(t.line(TEXT).await, vec![12, 10, 11, 13]);
}

#[tokio::test]
async fn joining_twice_is_refused() {
    let t = text_queue(QueueOptions::default()).await;
    t.join(TEXT, 10).await.unwrap();

    assert_eq!(t.join(TEXT, 10).await, Err(QueueError::AlreadyQueued));
    assert_eq!(t.line(TEXT).await, vec![10]);
}

#[tokio::test]
async fn pull_without_partial_refuses_short_queue() {
    let t = text_queue(QueueOptions {
        size_limit: Some(2),
        pull_count: Some(3),
        partial_pull: Some(false),
        ..Default::default()
    })
    .await;
    join_all(&t, TEXT, &[10, 11]).await;
    assert_eq!(t.join(TEXT, 12).await, Err(QueueError::Full));

    let result = t
        .send(Intent::Pull {
            queue: TEXT,
            count: None,
            destination: None,
        })
        .await;

    assert_eq!(
        result,
        Err(QueueError::InsufficientMembers {
            available: 2,
            requested: 3
        })
    );
    assert_eq!(t.line(TEXT).await, vec![10, 11]);
}

#[tokio::test]
async fn partial_pull_takes_what_is_there() {
    let t = text_queue(QueueOptions {
        pull_count: Some(3),
        ..Default::default()
    })
    .await;
    join_all(&t, TEXT, &[10, 11]).await;

    let outcome = t
        .send(Intent::Pull {
            queue: TEXT,
            count: None,
            destination: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Pulled(vec![10, 11]));
    assert!(t.line(TEXT).await.is_empty());
}

#[tokio::test]
async fn pull_admits_from_the_head() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11, 12, 13, 14]).await;

    let outcome = t
        .send(Intent::Pull {
            queue: TEXT,
            count: Some(2),
            destination: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Pulled(vec![10, 11]));
    assert_eq!(t.line(TEXT).await, vec![12, 13, 14]);
}

#[tokio::test]
async fn pull_from_empty_queue_fails() {
    let t = text_queue(QueueOptions::default()).await;

    let result = t
        .send(Intent::Pull {
            queue: TEXT,
            count: Some(1),
            destination: None,
        })
        .await;

    assert_eq!(result, Err(QueueError::Empty));
}

#[tokio::test]
async fn kick_keeps_everyone_else_in_order() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11, 12, 13, 14]).await;

    let outcome = t
        .send(Intent::Kick {
            queue: TEXT,
            members: vec![12],
        })
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Kicked(vec![12]));
    assert_eq!(t.line(TEXT).await, vec![10, 11, 13, 14]);

    let again = t
        .send(Intent::Kick {
            queue: TEXT,
            members: vec![12],
        })
        .await;
    assert_eq!(again, Err(QueueError::NotQueued));
}

#[tokio::test]
async fn leave_and_rejoin_goes_to_the_back() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11, 12]).await;

    let outcome = t
        .send(Intent::Leave {
            queue: TEXT,
            member: 10,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Left(entry) if entry.member_id == 10));
    t.join(TEXT, 10).await.unwrap();

    assert_eq!(t.line(TEXT).await, vec![11, 12, 10]);
    assert_eq!(
        t.send(Intent::Leave {
            queue: TEXT,
            member: 99
        })
        .await,
        Err(QueueError::NotQueued)
    );
}

#[tokio::test]
async fn clear_reports_who_was_removed() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11]).await;

    let outcome = t.send(Intent::Clear { queue: TEXT }).await.unwrap();

    assert_eq!(outcome, Outcome::Cleared(vec![10, 11]));
    assert!(t.line(TEXT).await.is_empty());
}

#[tokio::test]
async fn shuffle_permutes_the_line() {
    let t = text_queue(QueueOptions::default()).await;
    let members = [10, 11, 12, 13, 14, 15];
    join_all(&t, TEXT, &members).await;

    t.send(Intent::Shuffle { queue: TEXT }).await.unwrap();

    let mut line = t.line(TEXT).await;
    line.sort_unstable();
    assert_eq!(line, members.to_vec());
}

#[tokio::test]
async fn shuffle_gives_everyone_a_fair_shot_at_the_front() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11, 12]).await;

    let mut fronts: HashMap<i64, usize> = HashMap::new();
    for _ in 0..300 {
        t.send(Intent::Shuffle { queue: TEXT }).await.unwrap();
        *fronts.entry(t.line(TEXT).await[0]).or_default() += 1;
    }

    // Expect about 100 each.
    for member in [10, 11, 12] {
        let seen = fronts.get(&member).copied().unwrap_or(0);
        assert!(seen > 50, "member {member} was first only {seen} times");
    }
}

#[tokio::test]
async fn shuffle_keeps_priority_members_ahead() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11, 12]).await;
    for member in [20, 21] {
        t.send(Intent::Join {
            queue: TEXT,
            member,
            priority: true,
        })
        .await
        .unwrap();
    }

    for _ in 0..50 {
        t.send(Intent::Shuffle { queue: TEXT }).await.unwrap();
        let line = t.line(TEXT).await;
        let mut head = line[..2].to_vec();
        head.sort_unstable();
        let mut tail = line[2..].to_vec();
        tail.sort_unstable();
        assert_eq!(head, vec![20, 21], "line {line:?}");
        assert_eq!(tail, vec![10, 11, 12], "line {line:?}");
    }
}

#[tokio::test]
async fn waiting_members_are_muted_and_given_the_role() {
    const ROLE: i64 = 7;
    let t = TestEngine::start().await;
    t.create(VOICE, QueueKind::Voice, QueueOptions::default()).await;
    for setting in [QueueSetting::MuteOnJoin(true), QueueSetting::Role(Some(ROLE))] {
        t.send(Intent::Configure {
            queue: VOICE,
            setting,
        })
        .await
        .unwrap();
    }

    join_all(&t, VOICE, &[10, 11, 12]).await;
    for member in [10, 11, 12] {
        assert!(t.platform.is_muted(member), "member {member} not muted");
        assert!(t.platform.has_role(member, ROLE), "member {member} lacks role");
    }

    // Pulled from the head.
    assert_eq!(
        t.send(Intent::Pull {
            queue: VOICE,
            count: Some(1),
            destination: None,
        })
        .await,
        Ok(Outcome::Pulled(vec![10]))
    );
    assert!(!t.platform.is_muted(10));
    assert!(!t.platform.has_role(10, ROLE));

    t.send(Intent::Kick {
        queue: VOICE,
        members: vec![11],
    })
    .await
    .unwrap();
    assert!(!t.platform.is_muted(11));
    assert!(!t.platform.has_role(11, ROLE));

    // Still waiting.
    assert!(t.platform.is_muted(12));
    assert!(t.platform.has_role(12, ROLE));

    t.send(Intent::Leave {
        queue: VOICE,
        member: 12,
    })
    .await
    .unwrap();
    assert!(!t.platform.is_muted(12));
    assert!(!t.platform.has_role(12, ROLE));
}

#[tokio::test]
async fn role_without_mute_on_text_queue() {
    const ROLE: i64 = 8;
    let t = text_queue(QueueOptions::default()).await;
    for setting in [QueueSetting::MuteOnJoin(true), QueueSetting::Role(Some(ROLE))] {
        t.send(Intent::Configure {
            queue: TEXT,
            setting,
        })
        .await
        .unwrap();
    }

    t.join(TEXT, 10).await.unwrap();
    assert!(t.platform.has_role(10, ROLE));
    // Text queues never mute.
    assert!(!t.platform.is_muted(10));

    t.send(Intent::Clear { queue: TEXT }).await.unwrap();
    assert!(!t.platform.has_role(10, ROLE));
}

#[tokio::test]
async fn locked_queue_refuses_joins_until_unlocked() {
    let t = text_queue(QueueOptions::default()).await;
    t.send(Intent::Configure {
        queue: TEXT,
        setting: QueueSetting::Lock(true),
    })
    .await
    .unwrap();

    assert_eq!(t.join(TEXT, 10).await, Err(QueueError::Locked));

    t.send(Intent::Configure {
        queue: TEXT,
        setting: QueueSetting::Lock(false),
    })
    .await
    .unwrap();
    t.join(TEXT, 10).await.unwrap();
    assert_eq!(t.line(TEXT).await, vec![10]);
}

#[tokio::test]
async fn lowering_the_limit_evicts_nobody() {
    let t = text_queue(QueueOptions::default()).await;
    join_all(&t, TEXT, &[10, 11, 12]).await;

    let outcome = t
        .send(Intent::SetLimit {
            queue: TEXT,
            limit: Some(1),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Configured(record) if record.size_limit == Some(1)));

    assert_eq!(t.line(TEXT).await, vec![10, 11, 12]);
    assert_eq!(t.join(TEXT, 13).await, Err(QueueError::Full));
}

#[tokio::test]
async fn deleted_queue_is_gone() {
    let t = text_queue(QueueOptions::default()).await;
    t.join(TEXT, 10).await.unwrap();

    assert_eq!(
        t.send(Intent::DeleteQueue { queue: TEXT }).await,
        Ok(Outcome::Deleted)
    );
    assert_eq!(t.join(TEXT, 11).await, Err(QueueError::NoSuchQueue(TEXT)));
    assert_eq!(
        t.send(Intent::DeleteQueue { queue: TEXT }).await,
        Err(QueueError::NoSuchQueue(TEXT))
    );

    // The channel can host a fresh queue afterwards.
    t.create(TEXT, QueueKind::Text, QueueOptions::default()).await;
    assert!(t.line(TEXT).await.is_empty());
}

#[tokio::test]
async fn creating_a_second_queue_on_a_channel_fails() {
    let t = text_queue(QueueOptions::default()).await;

    let result = t
        .send(Intent::CreateQueue {
            queue: TEXT,
            kind: QueueKind::Voice,
            options: QueueOptions::default(),
        })
        .await;

    assert_eq!(result, Err(QueueError::QueueExists(TEXT)));
}

#[tokio::test]
async fn channel_deletion_drops_the_queue() {
    let t = text_queue(QueueOptions::default()).await;

    t.event(PlatformEvent::ChannelDeleted { channel: TEXT }).await;

    let engine = &t.engine;
    eventually(move || async move {
        !engine.queues.contains(TEXT) && engine.db.queues().find(TEXT).await.unwrap().is_none()
    })
    .await;
}

#[tokio::test]
async fn display_follows_the_line() {
    let t = text_queue(QueueOptions {
        header: Some("Support".into()),
        ..Default::default()
    })
    .await;
    t.join(TEXT, 10).await.unwrap();

    let Outcome::Displayed(target) = t
        .send(Intent::Display {
            queue: TEXT,
            surface: 500,
        })
        .await
        .unwrap()
    else {
        panic!("expected a display target");
    };
    let content = t.surface.content(target).unwrap();
    assert!(content.contains("Support"));
    assert!(content.contains("<@10>"));

    t.join(TEXT, 11).await.unwrap();
    let surface = &t.surface;
    eventually(move || async move {
        surface
            .content(target)
            .is_some_and(|c| c.contains("2. <@11>"))
    })
    .await;
}

#[tokio::test]
async fn joining_the_voice_channel_queues_the_member() {
    let t = TestEngine::start().await;
    t.create(VOICE, QueueKind::Voice, QueueOptions::default()).await;

    t.voice(10, None, Some(VOICE)).await;
    t.voice(11, None, Some(VOICE)).await;
    t.wait_for_line(VOICE, &[10, 11]).await;

    // No grace period: leaving the channel leaves the queue.
    t.voice(10, Some(VOICE), None).await;
    t.wait_for_line(VOICE, &[11]).await;
}

#[tokio::test]
async fn returning_within_grace_keeps_the_place() {
    let t = TestEngine::start().await;
    t.create(
        VOICE,
        QueueKind::Voice,
        QueueOptions {
            grace_period: Some(1),
            ..Default::default()
        },
    )
    .await;
    t.voice(10, None, Some(VOICE)).await;
    t.voice(11, None, Some(VOICE)).await;
    t.wait_for_line(VOICE, &[10, 11]).await;

    t.voice(10, Some(VOICE), None).await;
    t.wait_for_grace(VOICE, 10, true).await;
    t.voice(10, None, Some(VOICE)).await;
    t.wait_for_grace(VOICE, 10, false).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let snapshot = t.engine.queues.snapshot(VOICE).await.unwrap();
    let states: Vec<_> = snapshot
        .entries
        .iter()
        .map(|e| (e.member_id, e.state()))
        .collect();
    assert_eq!(
        states,
        vec![(10, MemberState::Active), (11, MemberState::Active)]
    );
}

#[tokio::test]
async fn grace_expiry_removes_the_member() {
    let mut t = TestEngine::start().await;
    t.create(
        VOICE,
        QueueKind::Voice,
        QueueOptions {
            grace_period: Some(1),
            ..Default::default()
        },
    )
    .await;
    t.voice(10, None, Some(VOICE)).await;
    t.voice(11, None, Some(VOICE)).await;
    t.wait_for_line(VOICE, &[10, 11]).await;

    t.voice(10, Some(VOICE), None).await;

    assert_eq!(
        t.next_notice().await,
        Notice::GraceExpired {
            queue: VOICE,
            member: 10
        }
    );
    assert_eq!(t.line(VOICE).await, vec![11]);
}

#[tokio::test]
async fn restart_reconciles_with_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("lineup.db").to_string_lossy().into_owned();

    {
        let t = TestEngine::start_with(Setup {
            db_path: db_path.clone(),
            ..Default::default()
        })
        .await;
        t.create(
            VOICE,
            QueueKind::Voice,
            QueueOptions {
                grace_period: Some(60),
                ..Default::default()
            },
        )
        .await;
        t.create(TEXT, QueueKind::Text, QueueOptions::default()).await;
        join_all(&t, TEXT, &[20, 21]).await;

        for member in [10, 11, 12] {
            t.voice(member, None, Some(VOICE)).await;
        }
        t.wait_for_line(VOICE, &[10, 11, 12]).await;
        t.voice(11, Some(VOICE), None).await;
        t.wait_for_grace(VOICE, 11, true).await;
    }

    // While down: 12 left the channel and 13 came in.
    let t = TestEngine::start_with(Setup {
        db_path,
        occupants: vec![(10, VOICE), (13, VOICE)],
        ..Default::default()
    })
    .await;

    let mut channels = t.engine.queues.channels();
    channels.sort_unstable();
    assert_eq!(channels, vec![TEXT, VOICE]);
    assert_eq!(t.line(TEXT).await, vec![20, 21]);

    let snapshot = t.engine.queues.snapshot(VOICE).await.unwrap();
    let states: Vec<_> = snapshot
        .entries
        .iter()
        .map(|e| (e.member_id, e.state()))
        .collect();
    assert_eq!(
        states,
        vec![
            (10, MemberState::Active),
            (11, MemberState::Grace),
            (12, MemberState::Grace),
            (13, MemberState::Active),
        ]
    );
    assert!(t.engine.grace.is_armed(VOICE, 11));
    assert!(t.engine.grace.is_armed(VOICE, 12));
}
