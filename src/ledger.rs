//! Gift pool ledger — reservation protocol over fungible prize inventory.
//!
//! `reserved + consumed <= total` is enforced by the conditional `UPDATE`
//! itself, never checked after the fact: the availability predicate and the
//! increment execute as one statement, so concurrent reservers racing for
//! the last unit cannot both win.

use sqlx::SqlitePool;

use crate::errors::{EngineError, Result};
use crate::models::PoolEntry;

/// Seed or resize a pool entry. Shrinking `total` below what is already
/// reserved or consumed is rejected.
pub async fn upsert_entry(pool: &SqlitePool, gift_id: &str, total: i64) -> Result<()> {
    if total < 0 {
        return Err(EngineError::InvalidQuantity);
    }
    let res = sqlx::query(
        r#"
        INSERT INTO pool_entries (gift_id, total, reserved, consumed)
        VALUES (?1, ?2, 0, 0)
        ON CONFLICT (gift_id) DO UPDATE SET total = excluded.total
        WHERE excluded.total >= pool_entries.reserved + pool_entries.consumed
        "#,
    )
    .bind(gift_id)
    .bind(total)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(EngineError::InsufficientReserved(gift_id.to_string()));
    }
    Ok(())
}

pub async fn entry(pool: &SqlitePool, gift_id: &str) -> Result<Option<PoolEntry>> {
    let row = sqlx::query_as::<_, PoolEntry>(
        "SELECT gift_id, total, reserved, consumed FROM pool_entries WHERE gift_id = ?1",
    )
    .bind(gift_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Units not yet reserved or consumed. An unknown gift id has nothing
/// available.
pub async fn availability(pool: &SqlitePool, gift_id: &str) -> Result<i64> {
    Ok(entry(pool, gift_id)
        .await?
        .map(|e| e.availability())
        .unwrap_or(0))
}

/// Place a provisional hold on `qty` units. Returns `false` — not an error —
/// when fewer than `qty` units are available.
pub async fn reserve(pool: &SqlitePool, gift_id: &str, qty: i64) -> Result<bool> {
    if qty <= 0 {
        return Err(EngineError::InvalidQuantity);
    }
    let res = sqlx::query(
        r#"
        UPDATE pool_entries
        SET    reserved = reserved + ?1
        WHERE  gift_id = ?2 AND total - reserved - consumed >= ?1
        "#,
    )
    .bind(qty)
    .bind(gift_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Return `qty` held units to the pool — a cancelled contest or an
/// abandoned reservation after failed distribution.
pub async fn release(pool: &SqlitePool, gift_id: &str, qty: i64) -> Result<()> {
    if qty <= 0 {
        return Err(EngineError::InvalidQuantity);
    }
    let res = sqlx::query(
        r#"
        UPDATE pool_entries
        SET    reserved = reserved - ?1
        WHERE  gift_id = ?2 AND reserved >= ?1
        "#,
    )
    .bind(qty)
    .bind(gift_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(EngineError::InsufficientReserved(gift_id.to_string()));
    }
    Ok(())
}

/// Convert `qty` held units into consumed ones after a confirmed send. The
/// decrement and increment land in one statement; there is no intermediate
/// state where the units are neither reserved nor consumed.
pub async fn consume(pool: &SqlitePool, gift_id: &str, qty: i64) -> Result<()> {
    if qty <= 0 {
        return Err(EngineError::InvalidQuantity);
    }
    let res = sqlx::query(
        r#"
        UPDATE pool_entries
        SET    reserved = reserved - ?1, consumed = consumed + ?1
        WHERE  gift_id = ?2 AND reserved >= ?1
        "#,
    )
    .bind(qty)
    .bind(gift_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(EngineError::InsufficientReserved(gift_id.to_string()));
    }
    Ok(())
}
