//! Contest lifecycle: completion, idempotent ticks, second-chance draws,
//! and the recovery sweep.

mod common;

use contest_engine::db;
use contest_engine::distribution;
use contest_engine::models::{ActivityKind, ActivityType, BoostKind, ContestStatus, Prize};
use contest_engine::scheduler;
use contest_engine::scoring;

#[tokio::test]
async fn completes_elapsed_contest_and_distributes() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest =
        common::active_contest(&pool, ActivityType::All, 2, common::custom_prizes(2)).await;

    scoring::apply_activity(&pool, contest, 1, ActivityKind::Comment)
        .await
        .unwrap();
    scoring::apply_activity(&pool, contest, 2, ActivityKind::Reaction)
        .await
        .unwrap();
    common::force_ended(&pool, contest).await;

    let summary = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(summary.completed, 1);

    let c = db::get_contest(&pool, contest).await.unwrap();
    assert_eq!(c.status_enum(), Some(ContestStatus::Completed));
    assert!(c.second_chance_at.is_some());

    let winners = db::winners_of(&pool, contest).await.unwrap();
    assert_eq!(winners.len(), 2);
    assert_eq!(winners[0].participant_id, 1);
    assert_eq!(winners[0].points, 3);
    assert_eq!(winners[1].participant_id, 2);
    assert_eq!(winners[1].points, 1);

    let records = distribution::for_contest(&pool, contest).await.unwrap();
    assert_eq!(records.len(), 2);
    for r in &records {
        assert_eq!(r.attempts, 1);
        assert_eq!(r.status, "sent");
    }
}

#[tokio::test]
async fn immediate_second_tick_is_a_no_op() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest =
        common::active_contest(&pool, ActivityType::All, 1, common::custom_prizes(1)).await;

    scoring::apply_activity(&pool, contest, 1, ActivityKind::Reaction)
        .await
        .unwrap();
    common::force_ended(&pool, contest).await;

    let first = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(first.completed, 1);

    let second = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(second.completed, 0);
    assert_eq!(second.second_chance, 0);
    assert_eq!(second.recovered, 0);

    // No duplicated winners or distribution records.
    assert_eq!(db::winners_of(&pool, contest).await.unwrap().len(), 1);
    assert_eq!(
        distribution::for_contest(&pool, contest).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn zero_participants_still_complete() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest =
        common::active_contest(&pool, ActivityType::All, 3, common::custom_prizes(3)).await;
    common::force_ended(&pool, contest).await;

    let summary = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(summary.completed, 1);

    let c = db::get_contest(&pool, contest).await.unwrap();
    assert_eq!(c.status_enum(), Some(ContestStatus::Completed));
    assert!(db::winners_of(&pool, contest).await.unwrap().is_empty());
    assert!(distribution::for_contest(&pool, contest)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn cancelled_contests_are_left_alone() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest =
        common::active_contest(&pool, ActivityType::All, 1, common::custom_prizes(1)).await;

    db::transition_contest(&pool, contest, ContestStatus::Cancelled)
        .await
        .unwrap();
    common::force_ended(&pool, contest).await;

    let summary = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(summary.completed, 0);

    let c = db::get_contest(&pool, contest).await.unwrap();
    assert_eq!(c.status_enum(), Some(ContestStatus::Cancelled));
}

#[tokio::test]
async fn boosted_scenario_ranks_and_distributes_per_position() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest = common::active_contest(
        &pool,
        ActivityType::All,
        2,
        vec![
            Prize::OnDemandGift {
                gift_id: "grand_gift".to_string(),
            },
            Prize::OnDemandGift {
                gift_id: "runner_up_gift".to_string(),
            },
        ],
    )
    .await;

    // A: 5 reactions + 1 comment, no boost = 8 pts.
    for _ in 0..5 {
        scoring::apply_activity(&pool, contest, 100, ActivityKind::Reaction)
            .await
            .unwrap();
    }
    scoring::apply_activity(&pool, contest, 100, ActivityKind::Comment)
        .await
        .unwrap();

    // B: 2 reactions under an x2 boost = 4 pts.
    scoring::apply_boost(&pool, contest, 200, BoostKind::X2For24h, 100)
        .await
        .unwrap();
    for _ in 0..2 {
        scoring::apply_activity(&pool, contest, 200, ActivityKind::Reaction)
            .await
            .unwrap();
    }

    common::force_ended(&pool, contest).await;
    scheduler::run_tick(&state).await.unwrap();

    let winners = db::winners_of(&pool, contest).await.unwrap();
    assert_eq!(winners.len(), 2);
    assert_eq!((winners[0].participant_id, winners[0].points), (100, 8));
    assert_eq!((winners[1].participant_id, winners[1].points), (200, 4));

    let records = distribution::for_contest(&pool, contest).await.unwrap();
    assert_eq!(records.len(), 2);
    for r in &records {
        assert_eq!(r.attempts, 1);
        assert!(r.status == "sent" || r.status == "failed");
    }

    // Prizes went to the configured positions.
    let sent = state.gifts.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![
            (100, "grand_gift".to_string()),
            (200, "runner_up_gift".to_string())
        ]
    );
}

#[tokio::test]
async fn second_chance_draw_runs_exactly_once() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest =
        common::active_contest(&pool, ActivityType::All, 1, common::custom_prizes(1)).await;

    // One winner-to-be and five opted-in participants.
    scoring::apply_activity(&pool, contest, 1, ActivityKind::Comment)
        .await
        .unwrap();
    for p in 1..=5 {
        scoring::apply_activity(&pool, contest, p, ActivityKind::Reaction)
            .await
            .unwrap();
        assert!(db::second_chance_opt_in(&pool, contest, p, "shared_story")
            .await
            .unwrap());
    }
    // Opting in twice changes nothing.
    assert!(!db::second_chance_opt_in(&pool, contest, 3, "shared_story")
        .await
        .unwrap());

    common::force_ended(&pool, contest).await;

    // The test config's zero delay makes the draw due within the same tick.
    let summary = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.second_chance, 1);

    let winners = db::winners_of(&pool, contest).await.unwrap();
    // 1 primary + up to 3 second-chance winners, never the primary again.
    assert_eq!(winners.len(), 4);
    assert!(!winners[0].via_second_chance);
    for (i, w) in winners.iter().enumerate().skip(1) {
        assert!(w.via_second_chance);
        assert_eq!(w.position, i as i64 + 1);
        assert_ne!(w.participant_id, winners[0].participant_id);
    }

    // Each appended winner got the last configured prize.
    let records = distribution::for_contest(&pool, contest).await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.status == "sent"));

    // Re-running cannot draw again.
    let again = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(again.second_chance, 0);
    assert_eq!(db::winners_of(&pool, contest).await.unwrap().len(), 4);

    let c = db::get_contest(&pool, contest).await.unwrap();
    assert!(c.second_chance_done);
}

#[tokio::test]
async fn opt_in_requires_an_active_contest() {
    let pool = common::test_pool().await;
    let contest =
        common::active_contest(&pool, ActivityType::All, 1, common::custom_prizes(1)).await;
    common::force_ended(&pool, contest).await;
    db::transition_contest(&pool, contest, ContestStatus::Cancelled)
        .await
        .unwrap();

    assert!(db::second_chance_opt_in(&pool, contest, 1, "proof")
        .await
        .is_err());
}

#[tokio::test]
async fn recovery_sweep_redistributes_missing_records() {
    let pool = common::test_pool().await;
    let state = common::test_scheduler(pool.clone());
    let contest =
        common::active_contest(&pool, ActivityType::All, 2, common::custom_prizes(2)).await;

    // Simulate a crash after the completion commit but before any send:
    // winners persisted, contest completed, no distribution records.
    sqlx::query(
        "UPDATE contests SET status = 'completed', second_chance_done = 1 WHERE id = ?1",
    )
    .bind(contest)
    .execute(&pool)
    .await
    .unwrap();
    for (participant, position) in [(7i64, 1i64), (8, 2)] {
        sqlx::query(
            r#"
            INSERT INTO contest_winners (contest_id, participant_id, position, points, via_second_chance)
            VALUES (?1, ?2, ?3, 5, 0)
            "#,
        )
        .bind(contest)
        .bind(participant)
        .bind(position)
        .execute(&pool)
        .await
        .unwrap();
    }

    let summary = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(summary.recovered, 2);

    let records = distribution::for_contest(&pool, contest).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == "sent" && r.attempts == 1));

    // The sweep has nothing left to do afterwards.
    let again = scheduler::run_tick(&state).await.unwrap();
    assert_eq!(again.recovered, 0);
}
