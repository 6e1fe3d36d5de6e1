//! Leaderboard ranker — a deterministic total order over participants.
//!
//! Primary key descending points; ties break on ascending last-activity
//! (earlier, sustained engagement beats a last-minute burst), then on
//! participant id so the order is total. Rank is always recomputed from the
//! live rows; no cached rank is trusted at read time.

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool};

use crate::db;
use crate::errors::Result;
use crate::models::ParticipantStats;

#[derive(Debug, Clone, Serialize)]
pub struct RankInfo {
    pub rank: i64,
    pub total: i64,
}

/// A page of the contest leaderboard in ranking order.
///
/// Generic over the executor so contest completion can take its one
/// consistent snapshot inside the completing transaction.
pub async fn leaderboard<'e, E>(
    executor: E,
    contest_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ParticipantStats>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, ParticipantStats>(
        r#"
        SELECT * FROM participant_stats
        WHERE  contest_id = ?1
        ORDER  BY points DESC, last_activity_at ASC, participant_id ASC
        LIMIT  ?2 OFFSET ?3
        "#,
    )
    .bind(contest_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Live rank of one participant: `count(strictly ahead) + 1`, plus the
/// participant total. `None` when the participant has no stats row.
pub async fn position_of(
    pool: &SqlitePool,
    contest_id: i64,
    participant_id: i64,
) -> Result<Option<RankInfo>> {
    let Some(me) = db::stats_of(pool, contest_id, participant_id).await? else {
        return Ok(None);
    };

    let (ahead,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM participant_stats
        WHERE  contest_id = ?1
          AND (points > ?2
           OR (points = ?2 AND last_activity_at < ?3)
           OR (points = ?2 AND last_activity_at = ?3 AND participant_id < ?4))
        "#,
    )
    .bind(contest_id)
    .bind(me.points)
    .bind(me.last_activity_at)
    .bind(participant_id)
    .fetch_one(pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM participant_stats WHERE contest_id = ?1")
            .bind(contest_id)
            .fetch_one(pool)
            .await?;

    Ok(Some(RankInfo {
        rank: ahead + 1,
        total,
    }))
}
