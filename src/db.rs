//! Database layer — pool setup, contest lifecycle, winners, opt-ins, and
//! the recovery query for interrupted distributions.
//!
//! Every state transition is a single conditional `UPDATE` whose
//! `rows_affected` tells the caller whether it won the transition; there is
//! no application-level locking anywhere.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::{EngineError, Result};
use crate::models::{
    ActivityType, Contest, ContestDuration, ContestStatus, ParticipantStats, Prize,
    SecondChanceEntry, Winner,
};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Contest lifecycle
// ─────────────────────────────────────────────────────────

/// Parameters for a new draft contest.
#[derive(Debug, Clone)]
pub struct NewContest {
    pub channel_id: i64,
    pub activity_type: ActivityType,
    pub duration: ContestDuration,
    pub winners_count: i64,
    pub prizes: Vec<Prize>,
}

/// Insert a draft contest. The prize list must carry exactly one prize per
/// winner position, in order.
pub async fn create_contest(pool: &SqlitePool, new: &NewContest) -> Result<i64> {
    if !(1..=100).contains(&new.winners_count) {
        return Err(EngineError::InvalidWinnersCount(new.winners_count));
    }
    if new.prizes.len() as i64 != new.winners_count {
        return Err(EngineError::PrizeCountMismatch {
            expected: new.winners_count,
            got: new.prizes.len() as i64,
        });
    }

    let prizes = serde_json::to_string(&new.prizes)?;
    let res = sqlx::query(
        r#"
        INSERT INTO contests (channel_id, status, activity_type, duration_hours, winners_count, prizes)
        VALUES (?1, 'draft', ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(new.channel_id)
    .bind(new.activity_type.as_str())
    .bind(new.duration.hours())
    .bind(new.winners_count)
    .bind(prizes)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

pub async fn get_contest(pool: &SqlitePool, contest_id: i64) -> Result<Contest> {
    sqlx::query_as::<_, Contest>("SELECT * FROM contests WHERE id = ?1")
        .bind(contest_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::ContestNotFound(contest_id))
}

/// Apply a plain status transition after checking the transition matrix.
/// The `WHERE status = current` guard makes concurrent callers lose cleanly.
pub async fn transition_contest(
    pool: &SqlitePool,
    contest_id: i64,
    to: ContestStatus,
) -> Result<()> {
    let contest = get_contest(pool, contest_id).await?;
    let from = contest
        .status_enum()
        .ok_or_else(|| EngineError::Config(format!("unknown status '{}'", contest.status)))?;
    if !from.can_transition(to) {
        return Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    let res = sqlx::query("UPDATE contests SET status = ?1 WHERE id = ?2 AND status = ?3")
        .bind(to.as_str())
        .bind(contest_id)
        .bind(from.as_str())
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    Ok(())
}

/// Move a paid contest into `active`, stamping its time window from the
/// configured duration. `starts_at < ends_at` holds by construction.
pub async fn activate_contest(pool: &SqlitePool, contest_id: i64, now: i64) -> Result<()> {
    let contest = get_contest(pool, contest_id).await?;
    let from = contest
        .status_enum()
        .ok_or_else(|| EngineError::Config(format!("unknown status '{}'", contest.status)))?;
    if !from.can_transition(ContestStatus::Active) {
        return Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: ContestStatus::Active.as_str().to_string(),
        });
    }

    let prizes = contest.prize_list()?;
    if prizes.len() as i64 != contest.winners_count {
        return Err(EngineError::PrizeCountMismatch {
            expected: contest.winners_count,
            got: prizes.len() as i64,
        });
    }

    let ends_at = now + contest.duration_hours * 3600;
    let res = sqlx::query(
        r#"
        UPDATE contests
        SET    status = 'active', starts_at = ?1, ends_at = ?2
        WHERE  id = ?3 AND status = ?4
        "#,
    )
    .bind(now)
    .bind(ends_at)
    .bind(contest_id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: ContestStatus::Active.as_str().to_string(),
        });
    }
    Ok(())
}

/// Active contests whose time window has elapsed.
pub async fn due_contests(pool: &SqlitePool, now: i64) -> Result<Vec<Contest>> {
    let rows = sqlx::query_as::<_, Contest>(
        r#"
        SELECT * FROM contests
        WHERE  status = 'active' AND ends_at IS NOT NULL AND ends_at <= ?1
        ORDER  BY ends_at ASC
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Completed contests whose second-chance draw has come due.
pub async fn second_chance_due(pool: &SqlitePool, now: i64) -> Result<Vec<Contest>> {
    let rows = sqlx::query_as::<_, Contest>(
        r#"
        SELECT * FROM contests
        WHERE  status = 'completed'
          AND  second_chance_done = 0
          AND  second_chance_at IS NOT NULL
          AND  second_chance_at <= ?1
        ORDER  BY second_chance_at ASC
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Winners
// ─────────────────────────────────────────────────────────

pub async fn winners_of(pool: &SqlitePool, contest_id: i64) -> Result<Vec<Winner>> {
    let rows = sqlx::query_as::<_, Winner>(
        r#"
        SELECT contest_id, participant_id, position, points, via_second_chance
        FROM   contest_winners
        WHERE  contest_id = ?1
        ORDER  BY position ASC
        "#,
    )
    .bind(contest_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Winners of completed contests that have no distribution record yet —
/// the recovery sweep re-runs distribution for exactly these.
pub async fn winners_missing_distribution(pool: &SqlitePool) -> Result<Vec<Winner>> {
    let rows = sqlx::query_as::<_, Winner>(
        r#"
        SELECT w.contest_id, w.participant_id, w.position, w.points, w.via_second_chance
        FROM   contest_winners w
        JOIN   contests c ON c.id = w.contest_id
        LEFT   JOIN distributions d
               ON  d.contest_id = w.contest_id
               AND d.participant_id = w.participant_id
               AND d.position = w.position
        WHERE  c.status = 'completed' AND d.id IS NULL
        ORDER  BY w.contest_id ASC, w.position ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Participant stats (reads; writes live in the scoring engine)
// ─────────────────────────────────────────────────────────

pub async fn stats_of(
    pool: &SqlitePool,
    contest_id: i64,
    participant_id: i64,
) -> Result<Option<ParticipantStats>> {
    let row = sqlx::query_as::<_, ParticipantStats>(
        "SELECT * FROM participant_stats WHERE contest_id = ?1 AND participant_id = ?2",
    )
    .bind(contest_id)
    .bind(participant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Second-chance opt-ins
// ─────────────────────────────────────────────────────────

/// Record an opt-in for the delayed bonus draw. Returns `false` when the
/// participant already opted in. The contest must still be active.
pub async fn second_chance_opt_in(
    pool: &SqlitePool,
    contest_id: i64,
    participant_id: i64,
    proof: &str,
) -> Result<bool> {
    let contest = get_contest(pool, contest_id).await?;
    if contest.status_enum() != Some(ContestStatus::Active) {
        return Err(EngineError::ContestNotAcceptingActivity(contest_id));
    }

    let res = sqlx::query(
        r#"
        INSERT OR IGNORE INTO second_chance (contest_id, participant_id, proof)
        VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(proof)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn second_chance_entries(
    pool: &SqlitePool,
    contest_id: i64,
) -> Result<Vec<SecondChanceEntry>> {
    let rows = sqlx::query_as::<_, SecondChanceEntry>(
        "SELECT * FROM second_chance WHERE contest_id = ?1",
    )
    .bind(contest_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Wallets
// ─────────────────────────────────────────────────────────

pub async fn wallet_address(pool: &SqlitePool, participant_id: i64) -> Result<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT address FROM wallets WHERE participant_id = ?1")
            .bind(participant_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(a,)| a))
}

pub async fn set_wallet(pool: &SqlitePool, participant_id: i64, address: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wallets (participant_id, address) VALUES (?1, ?2)
        ON CONFLICT (participant_id) DO UPDATE SET address = excluded.address
        "#,
    )
    .bind(participant_id)
    .bind(address)
    .execute(pool)
    .await?;
    Ok(())
}
