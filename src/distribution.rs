//! Prize distribution engine — resolves each winner's configured prize into
//! a delivery attempt with bounded, auditable retries.
//!
//! The `(contest, winner, position)` unique key on the distributions table
//! is the idempotency key: it is looked up before any mutation, so
//! re-entrant scheduler runs and manual retries converge on the same record
//! instead of duplicating work. Batches run strictly sequentially with a
//! pacing delay between sends to keep the external relay off its rate
//! limits.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::db;
use crate::errors::{EngineError, Result};
use crate::ledger;
use crate::models::{Contest, Distribution, DistributionStatus, Prize, Winner};
use crate::sender::{ChainTransfer, GiftSender};

/// Total delivery attempts a record may consume before manual intervention.
pub const MAX_ATTEMPTS: i64 = 3;

pub struct Distributor<'a, S, C> {
    pool: &'a SqlitePool,
    gifts: &'a S,
    chain: &'a C,
    pacing_ms: u64,
}

impl<'a, S: GiftSender, C: ChainTransfer> Distributor<'a, S, C> {
    pub fn new(pool: &'a SqlitePool, gifts: &'a S, chain: &'a C, pacing_ms: u64) -> Self {
        Self {
            pool,
            gifts,
            chain,
            pacing_ms,
        }
    }

    /// Distribute prizes to a batch of winners in position order. A failed
    /// winner is recorded and logged; it never aborts the rest of the batch.
    pub async fn distribute(&self, contest: &Contest, winners: &[Winner]) -> Result<()> {
        let prizes = contest.prize_list()?;
        for (i, winner) in winners.iter().enumerate() {
            if i > 0 && self.pacing_ms > 0 {
                sleep(Duration::from_millis(self.pacing_ms)).await;
            }
            if let Err(e) = self.distribute_one(contest.id, &prizes, winner).await {
                warn!(
                    "Distribution failed for contest {} position {}: {e}",
                    contest.id, winner.position
                );
            }
        }
        Ok(())
    }

    async fn distribute_one(
        &self,
        contest_id: i64,
        prizes: &[Prize],
        winner: &Winner,
    ) -> Result<()> {
        let Some(prize) = Prize::for_position(prizes, winner.position) else {
            warn!(
                "No prize configured at position {} of contest {contest_id}",
                winner.position
            );
            return Ok(());
        };
        let record = get_or_create(
            self.pool,
            contest_id,
            winner.participant_id,
            winner.position,
            prize,
        )
        .await?;
        self.attempt(&record, prize).await
    }

    /// Re-enter the per-winner logic for a stored record — the admin path
    /// for recovering a `failed` delivery. Respects the attempts ceiling.
    pub async fn retry(&self, distribution_id: i64) -> Result<Distribution> {
        let record = by_id(self.pool, distribution_id).await?;
        if record.status_enum() == Some(DistributionStatus::Sent) {
            info!("Distribution {distribution_id} already sent; nothing to retry");
            return Ok(record);
        }
        if record.attempts >= MAX_ATTEMPTS {
            return Err(EngineError::AttemptsExhausted(distribution_id));
        }
        let prize = record.prize()?;
        self.attempt(&record, &prize).await?;
        by_id(self.pool, distribution_id).await
    }

    /// One delivery attempt against an existing record. Wallet-address
    /// preconditions fail the record without consuming an attempt; every
    /// other failure counts against the budget.
    async fn attempt(&self, record: &Distribution, prize: &Prize) -> Result<()> {
        if record.status_enum() == Some(DistributionStatus::Sent) {
            return Ok(());
        }
        if record.attempts >= MAX_ATTEMPTS {
            warn!(
                "Distribution {} has exhausted its {MAX_ATTEMPTS} attempts; leaving for manual intervention",
                record.id
            );
            return Ok(());
        }

        // A transfer without a deliverable address is a configuration
        // problem for the participant to fix, not a transient fault.
        let address = match prize {
            Prize::BlockchainTransfer { .. } => {
                match db::wallet_address(self.pool, record.participant_id).await? {
                    None => {
                        mark_failed(self.pool, record.id, "no wallet address on file").await?;
                        return Err(EngineError::WalletMissing(record.participant_id));
                    }
                    Some(a) if !self.chain.validate_address(&a) => {
                        mark_failed(self.pool, record.id, "malformed wallet address").await?;
                        return Err(EngineError::InvalidAddress(a));
                    }
                    Some(a) => Some(a),
                }
            }
            _ => None,
        };

        if !begin_attempt(self.pool, record.id, Utc::now().timestamp()).await? {
            // Lost the conditional update to a concurrent attempt.
            return Ok(());
        }

        match self.deliver(record, prize, address.as_deref()).await {
            Ok(()) => {
                mark_sent(self.pool, record.id, Utc::now().timestamp()).await?;
                info!(
                    "Distribution {} sent (contest {}, position {})",
                    record.id, record.contest_id, record.position
                );
                Ok(())
            }
            Err(e) => {
                mark_failed(self.pool, record.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn deliver(
        &self,
        record: &Distribution,
        prize: &Prize,
        address: Option<&str>,
    ) -> Result<()> {
        let message = format!(
            "Congratulations — you placed #{} in the contest!",
            record.position
        );
        match prize {
            Prize::PooledGift { gift_id } => {
                let held = record.pool_reserved || ledger::reserve(self.pool, gift_id, 1).await?;
                if !held {
                    info!("Pool for gift {gift_id} depleted; sending on demand");
                    return self
                        .gifts
                        .send_gift(record.participant_id, gift_id, &message)
                        .await;
                }
                if !record.pool_reserved {
                    set_pool_reserved(self.pool, record.id, true).await?;
                }
                // On failure the reservation stays held for the retry.
                self.gifts
                    .send_gift(record.participant_id, gift_id, &message)
                    .await?;
                ledger::consume(self.pool, gift_id, 1).await?;
                set_pool_reserved(self.pool, record.id, false).await?;
                Ok(())
            }
            Prize::OnDemandGift { gift_id } => {
                self.gifts
                    .send_gift(record.participant_id, gift_id, &message)
                    .await
            }
            Prize::BlockchainTransfer { amount } => {
                let address =
                    address.ok_or(EngineError::WalletMissing(record.participant_id))?;
                let memo = format!(
                    "Contest {} prize, position {}",
                    record.contest_id, record.position
                );
                self.chain.transfer(address, *amount, &memo).await
            }
            Prize::Custom { label } => {
                // Sent here means queued for manual fulfillment.
                info!(
                    "Custom prize '{label}' for distribution {} queued for manual fulfillment",
                    record.id
                );
                Ok(())
            }
        }
    }

    /// Give up the pool reservation held by a failed record, returning the
    /// unit to shared inventory.
    pub async fn abandon(&self, distribution_id: i64) -> Result<()> {
        let record = by_id(self.pool, distribution_id).await?;
        if !record.pool_reserved {
            return Ok(());
        }
        if let Prize::PooledGift { gift_id } = record.prize()? {
            ledger::release(self.pool, &gift_id, 1).await?;
            set_pool_reserved(self.pool, record.id, false).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Record queries
// ─────────────────────────────────────────────────────────

pub async fn by_id(pool: &SqlitePool, distribution_id: i64) -> Result<Distribution> {
    sqlx::query_as::<_, Distribution>("SELECT * FROM distributions WHERE id = ?1")
        .bind(distribution_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::DistributionNotFound(distribution_id))
}

pub async fn for_contest(pool: &SqlitePool, contest_id: i64) -> Result<Vec<Distribution>> {
    let rows = sqlx::query_as::<_, Distribution>(
        "SELECT * FROM distributions WHERE contest_id = ?1 ORDER BY position ASC",
    )
    .bind(contest_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn get_or_create(
    pool: &SqlitePool,
    contest_id: i64,
    participant_id: i64,
    position: i64,
    prize: &Prize,
) -> Result<Distribution> {
    sqlx::query(
        r#"
        INSERT INTO distributions (contest_id, participant_id, position, prize_kind, prize_json)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (contest_id, participant_id, position) DO NOTHING
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(position)
    .bind(prize.kind_str())
    .bind(serde_json::to_string(prize)?)
    .execute(pool)
    .await?;

    let record = sqlx::query_as::<_, Distribution>(
        r#"
        SELECT * FROM distributions
        WHERE  contest_id = ?1 AND participant_id = ?2 AND position = ?3
        "#,
    )
    .bind(contest_id)
    .bind(participant_id)
    .bind(position)
    .fetch_one(pool)
    .await?;
    Ok(record)
}

/// Claim one attempt: increments the counter and moves to `processing` only
/// while the record is unsent and under budget.
async fn begin_attempt(pool: &SqlitePool, distribution_id: i64, now: i64) -> Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE distributions
        SET    attempts = attempts + 1, status = 'processing', last_attempt_at = ?1
        WHERE  id = ?2 AND status != 'sent' AND attempts < ?3
        "#,
    )
    .bind(now)
    .bind(distribution_id)
    .bind(MAX_ATTEMPTS)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

async fn mark_sent(pool: &SqlitePool, distribution_id: i64, now: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE distributions
        SET    status = 'sent', sent_at = ?1, error = NULL
        WHERE  id = ?2 AND status != 'sent'
        "#,
    )
    .bind(now)
    .bind(distribution_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_failed(pool: &SqlitePool, distribution_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE distributions
        SET    status = 'failed', error = ?1
        WHERE  id = ?2 AND status != 'sent'
        "#,
    )
    .bind(error)
    .bind(distribution_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn set_pool_reserved(pool: &SqlitePool, distribution_id: i64, held: bool) -> Result<()> {
    sqlx::query("UPDATE distributions SET pool_reserved = ?1 WHERE id = ?2")
        .bind(held)
        .bind(distribution_id)
        .execute(pool)
        .await?;
    Ok(())
}
