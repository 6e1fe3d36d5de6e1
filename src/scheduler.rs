//! Contest lifecycle scheduler — the single background task that closes
//! elapsed contests, runs delayed second-chance draws, and sweeps for
//! interrupted distributions.
//!
//! The claim (`active -> completing`), the ranking snapshot, the winner
//! insert, and the `completed` stamp all commit in one transaction: a crash
//! rolls the contest back to `active` for the next tick, and a concurrent
//! tick loses the claim and skips. External sends happen only after commit;
//! a crash between commit and send is healed by the recovery sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::distribution::Distributor;
use crate::errors::Result;
use crate::models::{Contest, Winner};
use crate::ranking;
use crate::sender::{ChainTransfer, GiftSender, HttpChainTransfer, HttpGiftSender};

/// Cap on second-chance winners appended per contest.
const SECOND_CHANCE_CAP: i64 = 3;

pub struct SchedulerState<S, C> {
    pub pool: SqlitePool,
    pub config: Config,
    pub gifts: S,
    pub chain: C,
}

pub type LiveSchedulerState = SchedulerState<HttpGiftSender, HttpChainTransfer>;

/// Owned handle to the scheduler task. The process keeps exactly one;
/// `stop` cancels the loop and awaits it on shutdown.
pub struct SchedulerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}

/// Spawn the scheduler loop as a background [`tokio`] task.
pub fn start(state: Arc<LiveSchedulerState>) -> SchedulerHandle {
    let token = CancellationToken::new();
    let child = token.clone();
    let task = tokio::spawn(async move {
        info!(
            "Scheduler starting — tick every {}s",
            state.config.tick_interval_secs
        );
        loop {
            tokio::select! {
                _ = child.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(state.config.tick_interval_secs)) => {
                    match run_tick(&state).await {
                        Ok(s) if s.completed + s.second_chance + s.recovered > 0 => {
                            info!(
                                "Tick: {} completed, {} second-chance draws, {} recovered",
                                s.completed, s.second_chance, s.recovered
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Scheduler tick error: {e}"),
                    }
                }
            }
        }
    });
    SchedulerHandle { token, task }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct TickSummary {
    pub completed: u32,
    pub second_chance: u32,
    pub recovered: u32,
}

/// One scheduler pass. Idempotent and safe to invoke manually for recovery
/// or testing: every transition is guarded by a conditional update, so an
/// immediate second run finds nothing left to claim.
pub async fn run_tick<S: GiftSender, C: ChainTransfer>(
    state: &SchedulerState<S, C>,
) -> Result<TickSummary> {
    let now = Utc::now().timestamp();
    let mut summary = TickSummary::default();

    for contest in db::due_contests(&state.pool, now).await? {
        match complete_contest(state, &contest, now).await {
            Ok(true) => summary.completed += 1,
            Ok(false) => {}
            // One failing contest must not starve the rest of the tick.
            Err(e) => error!("Failed to complete contest {}: {e}", contest.id),
        }
    }

    for contest in db::second_chance_due(&state.pool, now).await? {
        match run_second_chance(state, &contest).await {
            Ok(true) => summary.second_chance += 1,
            Ok(false) => {}
            Err(e) => error!("Second-chance draw failed for contest {}: {e}", contest.id),
        }
    }

    match recover_missing(state).await {
        Ok(n) => summary.recovered += n,
        Err(e) => error!("Recovery sweep failed: {e}"),
    }

    Ok(summary)
}

/// Close one elapsed contest: claim it, freeze the winner list at one
/// consistent read, persist winners with their position-indexed prizes, and
/// hand the batch to the distribution engine. Returns `false` when another
/// tick (or an external cancellation) got there first.
async fn complete_contest<S: GiftSender, C: ChainTransfer>(
    state: &SchedulerState<S, C>,
    contest: &Contest,
    now: i64,
) -> Result<bool> {
    let mut tx = state.pool.begin().await?;

    let claimed =
        sqlx::query("UPDATE contests SET status = 'completing' WHERE id = ?1 AND status = 'active'")
            .bind(contest.id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;
    if !claimed {
        return Ok(false);
    }

    let ranked = ranking::leaderboard(&mut *tx, contest.id, contest.winners_count, 0).await?;
    let winners: Vec<Winner> = ranked
        .iter()
        .enumerate()
        .map(|(i, s)| Winner {
            contest_id: contest.id,
            participant_id: s.participant_id,
            position: i as i64 + 1,
            points: s.points,
            via_second_chance: false,
        })
        .collect();

    for w in &winners {
        sqlx::query(
            r#"
            INSERT INTO contest_winners (contest_id, participant_id, position, points, via_second_chance)
            VALUES (?1, ?2, ?3, ?4, 0)
            "#,
        )
        .bind(w.contest_id)
        .bind(w.participant_id)
        .bind(w.position)
        .bind(w.points)
        .execute(&mut *tx)
        .await?;
    }

    let second_chance_at = now + state.config.second_chance_delay_secs;
    sqlx::query(
        r#"
        UPDATE contests
        SET    status = 'completed', second_chance_at = ?1
        WHERE  id = ?2 AND status = 'completing'
        "#,
    )
    .bind(second_chance_at)
    .bind(contest.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    // Zero participants still completes the contest, just with nothing to
    // distribute.
    info!(
        "Contest {} completed with {} winner(s)",
        contest.id,
        winners.len()
    );

    if !winners.is_empty() {
        let distributor = Distributor::new(
            &state.pool,
            &state.gifts,
            &state.chain,
            state.config.send_pacing_ms,
        );
        distributor.distribute(contest, &winners).await?;
    }
    Ok(true)
}

/// The delayed bonus draw: at most once per contest, pick up to
/// [`SECOND_CHANCE_CAP`] opted-in non-winners, append them after the
/// existing positions, and distribute. The `second_chance_done` flag is the
/// claim, so re-runs are no-ops regardless of wall clock.
async fn run_second_chance<S: GiftSender, C: ChainTransfer>(
    state: &SchedulerState<S, C>,
    contest: &Contest,
) -> Result<bool> {
    let mut tx = state.pool.begin().await?;

    let claimed = sqlx::query(
        r#"
        UPDATE contests
        SET    second_chance_done = 1
        WHERE  id = ?1 AND second_chance_done = 0 AND status = 'completed'
        "#,
    )
    .bind(contest.id)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;
    if !claimed {
        return Ok(false);
    }

    let picked: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT participant_id FROM second_chance
        WHERE  contest_id = ?1 AND is_winner = 0
          AND  participant_id NOT IN
               (SELECT participant_id FROM contest_winners WHERE contest_id = ?1)
        ORDER  BY RANDOM()
        LIMIT  ?2
        "#,
    )
    .bind(contest.id)
    .bind(SECOND_CHANCE_CAP)
    .fetch_all(&mut *tx)
    .await?;

    let (max_pos,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(position) FROM contest_winners WHERE contest_id = ?1")
            .bind(contest.id)
            .fetch_one(&mut *tx)
            .await?;
    let mut position = max_pos.unwrap_or(0);

    let mut appended = Vec::new();
    for (participant_id,) in picked {
        position += 1;
        let points: i64 = sqlx::query_as::<_, (i64,)>(
            "SELECT points FROM participant_stats WHERE contest_id = ?1 AND participant_id = ?2",
        )
        .bind(contest.id)
        .bind(participant_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|(p,)| p)
        .unwrap_or(0);

        sqlx::query(
            r#"
            INSERT INTO contest_winners (contest_id, participant_id, position, points, via_second_chance)
            VALUES (?1, ?2, ?3, ?4, 1)
            "#,
        )
        .bind(contest.id)
        .bind(participant_id)
        .bind(position)
        .bind(points)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE second_chance SET is_winner = 1 WHERE contest_id = ?1 AND participant_id = ?2",
        )
        .bind(contest.id)
        .bind(participant_id)
        .execute(&mut *tx)
        .await?;

        appended.push(Winner {
            contest_id: contest.id,
            participant_id,
            position,
            points,
            via_second_chance: true,
        });
    }

    tx.commit().await?;

    info!(
        "Second-chance draw for contest {}: {} additional winner(s)",
        contest.id,
        appended.len()
    );

    if !appended.is_empty() {
        let distributor = Distributor::new(
            &state.pool,
            &state.gifts,
            &state.chain,
            state.config.send_pacing_ms,
        );
        distributor.distribute(contest, &appended).await?;
    }
    Ok(true)
}

/// Re-invoke distribution for winners of completed contests that have no
/// distribution record — the crash-recovery path for work lost between the
/// completion commit and the first send.
async fn recover_missing<S: GiftSender, C: ChainTransfer>(
    state: &SchedulerState<S, C>,
) -> Result<u32> {
    let missing = db::winners_missing_distribution(&state.pool).await?;
    if missing.is_empty() {
        return Ok(0);
    }

    // Rows arrive ordered by contest, so adjacent grouping is enough.
    let mut by_contest: Vec<(i64, Vec<Winner>)> = Vec::new();
    for w in missing {
        match by_contest.last_mut() {
            Some((id, ws)) if *id == w.contest_id => ws.push(w),
            _ => by_contest.push((w.contest_id, vec![w])),
        }
    }

    let distributor = Distributor::new(
        &state.pool,
        &state.gifts,
        &state.chain,
        state.config.send_pacing_ms,
    );

    let mut count = 0u32;
    for (contest_id, winners) in by_contest {
        let contest = db::get_contest(&state.pool, contest_id).await?;
        info!(
            "Recovery: re-running distribution for contest {contest_id} ({} winner(s))",
            winners.len()
        );
        count += winners.len() as u32;
        distributor.distribute(&contest, &winners).await?;
    }
    Ok(count)
}
