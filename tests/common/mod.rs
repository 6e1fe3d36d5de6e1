//! Shared fixtures: in-memory database pools, seeded contests, and
//! recording fakes for the delivery boundaries.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use contest_engine::config::Config;
use contest_engine::db::{self, NewContest};
use contest_engine::errors::{EngineError, Result};
use contest_engine::models::{ActivityType, ContestDuration, ContestStatus, Prize};
use contest_engine::scheduler::SchedulerState;
use contest_engine::sender::{is_wallet_address, ChainTransfer, GiftSender};

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        api_port: 0,
        tick_interval_secs: 60,
        send_pacing_ms: 0,
        second_chance_delay_secs: 0,
        gift_api_url: "http://localhost:0/gifts".to_string(),
        chain_api_url: "http://localhost:0/transfers".to_string(),
        send_timeout_secs: 5,
    }
}

/// Create and activate a contest in one step.
pub async fn active_contest(
    pool: &SqlitePool,
    activity_type: ActivityType,
    winners_count: i64,
    prizes: Vec<Prize>,
) -> i64 {
    let id = db::create_contest(
        pool,
        &NewContest {
            channel_id: 777,
            activity_type,
            duration: ContestDuration::H24,
            winners_count,
            prizes,
        },
    )
    .await
    .expect("create contest");
    db::transition_contest(pool, id, ContestStatus::PendingPayment)
        .await
        .expect("to pending_payment");
    db::activate_contest(pool, id, now()).await.expect("activate");
    id
}

/// Push a contest's end time into the past so the scheduler sees it as due.
pub async fn force_ended(pool: &SqlitePool, contest_id: i64) {
    sqlx::query("UPDATE contests SET ends_at = ?1 WHERE id = ?2")
        .bind(now() - 5)
        .bind(contest_id)
        .execute(pool)
        .await
        .expect("force ended");
}

pub fn custom_prizes(n: usize) -> Vec<Prize> {
    (0..n)
        .map(|i| Prize::Custom {
            label: format!("reward-{}", i + 1),
        })
        .collect()
}

pub fn pooled_prizes(n: usize, gift_id: &str) -> Vec<Prize> {
    (0..n)
        .map(|_| Prize::PooledGift {
            gift_id: gift_id.to_string(),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Delivery fakes
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockGiftSender {
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<(i64, String)>>,
}

impl MockGiftSender {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl GiftSender for MockGiftSender {
    async fn send_gift(&self, recipient_id: i64, gift_ref: &str, _message: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::SendFailed("relay unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id, gift_ref.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockChain {
    pub fail: AtomicBool,
    pub transfers: Mutex<Vec<(String, i64)>>,
}

impl MockChain {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ChainTransfer for MockChain {
    fn validate_address(&self, address: &str) -> bool {
        is_wallet_address(address)
    }

    async fn transfer(&self, address: &str, amount: i64, _memo: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::SendFailed(
                "transfer service unavailable".to_string(),
            ));
        }
        self.transfers
            .lock()
            .unwrap()
            .push((address.to_string(), amount));
        Ok(())
    }
}

pub fn test_scheduler(pool: SqlitePool) -> SchedulerState<MockGiftSender, MockChain> {
    SchedulerState {
        pool,
        config: test_config(),
        gifts: MockGiftSender::default(),
        chain: MockChain::default(),
    }
}

/// A well-formed 48-character wallet address for transfer tests.
pub const GOOD_ADDRESS: &str = "UQBFzLt6Hg2PK-0y1Ss4uDMZ3ft7fW8cbkEJFGLx9a0_Zm4p";
