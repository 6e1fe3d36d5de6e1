//! Scoring engine — converts engagement signals into point deltas and
//! manages boost multipliers.
//!
//! All writes for one activity land in a single transaction of atomic
//! increment statements, so concurrent, unordered delivery of actions for
//! the same participant never loses an update. The active-contest check is
//! re-evaluated on every call, never cached.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::db;
use crate::errors::{EngineError, Result};
use crate::models::{ActivityKind, BoostKind, ContestStatus};

/// Apply one engagement action and return the points awarded.
///
/// Kinds excluded by the contest's activity setting award 0 and record
/// nothing — an idempotent no-op, not an error.
pub async fn apply_activity(
    pool: &SqlitePool,
    contest_id: i64,
    participant_id: i64,
    kind: ActivityKind,
) -> Result<i64> {
    let contest = db::get_contest(pool, contest_id).await?;
    let now = Utc::now().timestamp();

    let accepting = contest.status_enum() == Some(ContestStatus::Active)
        && contest.ends_at.map(|e| now < e).unwrap_or(false);
    if !accepting {
        return Err(EngineError::ContestNotAcceptingActivity(contest_id));
    }

    let activity_type = contest.activity_type_enum().ok_or_else(|| {
        EngineError::Config(format!(
            "unknown activity type '{}' on contest {contest_id}",
            contest.activity_type
        ))
    })?;
    if !activity_type.counts(kind) {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    expire_boosts(&mut tx, contest_id, participant_id, now).await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO participant_stats (contest_id, participant_id, last_activity_at)
        VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let (multiplier,): (f64,) = sqlx::query_as(
        "SELECT multiplier FROM participant_stats WHERE contest_id = ?1 AND participant_id = ?2",
    )
    .bind(contest_id)
    .bind(participant_id)
    .fetch_one(&mut *tx)
    .await?;

    let points = (kind.base_points() as f64 * multiplier).round() as i64;

    let (d_reactions, d_comments, d_replies) = match kind {
        ActivityKind::Reaction => (1, 0, 0),
        ActivityKind::Comment => (0, 1, 0),
        ActivityKind::Reply => (0, 0, 1),
    };

    sqlx::query(
        r#"
        UPDATE participant_stats
        SET    points = points + ?1,
               reactions = reactions + ?2,
               comments = comments + ?3,
               replies = replies + ?4,
               last_activity_at = ?5
        WHERE  contest_id = ?6 AND participant_id = ?7
        "#,
    )
    .bind(points)
    .bind(d_reactions)
    .bind(d_comments)
    .bind(d_replies)
    .bind(now)
    .bind(contest_id)
    .bind(participant_id)
    .execute(&mut *tx)
    .await?;

    // Contest-level aggregates; a reply counts as a comment here.
    sqlx::query(
        r#"
        UPDATE contests
        SET    total_reactions = total_reactions + ?1,
               total_comments = total_comments + ?2
        WHERE  id = ?3
        "#,
    )
    .bind(d_reactions)
    .bind(d_comments + d_replies)
    .bind(contest_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!("Participant {participant_id} earned {points} pts in contest {contest_id}");
    Ok(points)
}

/// Activate a point multiplier for a participant. At most one boost may be
/// active per (participant, contest); the new multiplier is cached on the
/// stats row so scoring reads it without a join.
pub async fn apply_boost(
    pool: &SqlitePool,
    contest_id: i64,
    participant_id: i64,
    kind: BoostKind,
    price_units: i64,
) -> Result<f64> {
    if price_units <= 0 {
        return Err(EngineError::InvalidQuantity);
    }

    let contest = db::get_contest(pool, contest_id).await?;
    let now = Utc::now().timestamp();

    let accepting = contest.status_enum() == Some(ContestStatus::Active)
        && contest.ends_at.map(|e| now < e).unwrap_or(false);
    if !accepting {
        return Err(EngineError::ContestNotAcceptingActivity(contest_id));
    }

    let mut tx = pool.begin().await?;

    expire_boosts(&mut tx, contest_id, participant_id, now).await?;

    let existing: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM boosts
        WHERE  contest_id = ?1 AND participant_id = ?2 AND is_active = 1
          AND  (expires_at IS NULL OR expires_at > ?3)
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(EngineError::BoostAlreadyActive);
    }

    let expires_at = kind.duration_secs().map(|d| now + d);

    sqlx::query(
        r#"
        INSERT INTO boosts (contest_id, participant_id, kind, multiplier, activated_at, expires_at, is_active)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(kind.as_str())
    .bind(kind.multiplier())
    .bind(now)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO participant_stats (contest_id, participant_id, last_activity_at)
        VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE participant_stats
        SET    multiplier = ?1, boost_expires_at = ?2
        WHERE  contest_id = ?3 AND participant_id = ?4
        "#,
    )
    .bind(kind.multiplier())
    .bind(expires_at)
    .bind(contest_id)
    .bind(participant_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Boost {} activated for participant {participant_id} in contest {contest_id}",
        kind.as_str()
    );
    Ok(kind.multiplier())
}

/// Lazy deactivation: boosts past expiry flip inactive and the cached
/// multiplier resets the first time they are read, keeping the read path
/// self-correcting without a background sweep. Both statements are
/// idempotent.
async fn expire_boosts(
    tx: &mut Transaction<'_, Sqlite>,
    contest_id: i64,
    participant_id: i64,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE boosts
        SET    is_active = 0
        WHERE  contest_id = ?1 AND participant_id = ?2 AND is_active = 1
          AND  expires_at IS NOT NULL AND expires_at <= ?3
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE participant_stats
        SET    multiplier = 1.0, boost_expires_at = NULL
        WHERE  contest_id = ?1 AND participant_id = ?2
          AND  boost_expires_at IS NOT NULL AND boost_expires_at <= ?3
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
