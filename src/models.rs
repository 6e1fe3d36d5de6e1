//! Domain types shared across the engine.
//!
//! Enums that cross the database boundary carry `as_str`/`parse` pairs and
//! are stored as short identifier strings; row structs mirror the tables in
//! `migrations/0001_init.sql`.

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

// ─────────────────────────────────────────────────────────
// Contest lifecycle
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Draft,
    PendingPayment,
    Active,
    Completing,
    Completed,
    Cancelled,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingPayment => "pending_payment",
            Self::Active => "active",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "pending_payment" => Some(Self::PendingPayment),
            "active" => Some(Self::Active),
            "completing" => Some(Self::Completing),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Transitions are monotonic and one-directional; `active -> cancelled`
    /// is the only escape hatch.
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::PendingPayment)
                | (Self::PendingPayment, Self::Active)
                | (Self::Active, Self::Completing)
                | (Self::Active, Self::Cancelled)
                | (Self::Completing, Self::Completed)
        )
    }
}

/// Which engagement signals a contest counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Reactions,
    Comments,
    All,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reactions => "reactions",
            Self::Comments => "comments",
            Self::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reactions" => Some(Self::Reactions),
            "comments" => Some(Self::Comments),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Whether an action kind earns points under this setting. A reply is a
    /// comment for gating purposes.
    pub fn counts(&self, kind: ActivityKind) -> bool {
        match self {
            Self::All => true,
            Self::Reactions => kind == ActivityKind::Reaction,
            Self::Comments => {
                kind == ActivityKind::Comment || kind == ActivityKind::Reply
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Reaction,
    Comment,
    Reply,
}

impl ActivityKind {
    pub fn base_points(&self) -> i64 {
        match self {
            Self::Reaction => 1,
            Self::Comment => 3,
            Self::Reply => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reaction" => Some(Self::Reaction),
            "comment" => Some(Self::Comment),
            "reply" => Some(Self::Reply),
            _ => None,
        }
    }
}

/// Fixed contest durations offered at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContestDuration {
    H24,
    H48,
    H72,
    D7,
}

impl ContestDuration {
    pub fn hours(&self) -> i64 {
        match self {
            Self::H24 => 24,
            Self::H48 => 48,
            Self::H72 => 72,
            Self::D7 => 168,
        }
    }

    pub fn from_hours(hours: i64) -> Option<Self> {
        match hours {
            24 => Some(Self::H24),
            48 => Some(Self::H48),
            72 => Some(Self::H72),
            168 => Some(Self::D7),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Boosts
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    /// Doubles points for 24 hours after activation.
    X2For24h,
    /// 1.5x until the contest ends; no independent expiry.
    X15Contest,
}

impl BoostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X2For24h => "x2_24h",
            Self::X15Contest => "x1_5_contest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "x2_24h" => Some(Self::X2For24h),
            "x1_5_contest" => Some(Self::X15Contest),
            _ => None,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Self::X2For24h => 2.0,
            Self::X15Contest => 1.5,
        }
    }

    /// Seconds until the boost expires on its own, if it does.
    pub fn duration_secs(&self) -> Option<i64> {
        match self {
            Self::X2For24h => Some(24 * 3600),
            Self::X15Contest => None,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Prizes
// ─────────────────────────────────────────────────────────

/// A prize configured at one winner position. Each variant carries only the
/// fields its delivery path needs; dispatch is an exhaustive match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prize {
    PooledGift { gift_id: String },
    OnDemandGift { gift_id: String },
    BlockchainTransfer { amount: i64 },
    Custom { label: String },
}

impl Prize {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::PooledGift { .. } => "pooled_gift",
            Self::OnDemandGift { .. } => "on_demand_gift",
            Self::BlockchainTransfer { .. } => "blockchain_transfer",
            Self::Custom { .. } => "custom",
        }
    }

    /// The prize configured at a 1-based winner position. Positions past the
    /// end of the list (second-chance winners) reuse the last entry.
    pub fn for_position(prizes: &[Prize], position: i64) -> Option<&Prize> {
        if position < 1 {
            return None;
        }
        prizes.get(position as usize - 1).or_else(|| prizes.last())
    }
}

// ─────────────────────────────────────────────────────────
// Distribution
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Row structs
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contest {
    pub id: i64,
    pub channel_id: i64,
    pub status: String,
    pub activity_type: String,
    pub duration_hours: i64,
    pub winners_count: i64,
    pub prizes: String,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub total_reactions: i64,
    pub total_comments: i64,
    pub second_chance_at: Option<i64>,
    pub second_chance_done: bool,
    pub created_at: i64,
}

impl Contest {
    pub fn status_enum(&self) -> Option<ContestStatus> {
        ContestStatus::parse(&self.status)
    }

    pub fn activity_type_enum(&self) -> Option<ActivityType> {
        ActivityType::parse(&self.activity_type)
    }

    pub fn prize_list(&self) -> Result<Vec<Prize>> {
        serde_json::from_str(&self.prizes).map_err(EngineError::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Winner {
    pub contest_id: i64,
    pub participant_id: i64,
    pub position: i64,
    pub points: i64,
    pub via_second_chance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParticipantStats {
    pub contest_id: i64,
    pub participant_id: i64,
    pub points: i64,
    pub reactions: i64,
    pub comments: i64,
    pub replies: i64,
    pub multiplier: f64,
    pub boost_expires_at: Option<i64>,
    pub last_activity_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Boost {
    pub id: i64,
    pub contest_id: i64,
    pub participant_id: i64,
    pub kind: String,
    pub multiplier: f64,
    pub activated_at: i64,
    pub expires_at: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolEntry {
    pub gift_id: String,
    pub total: i64,
    pub reserved: i64,
    pub consumed: i64,
}

impl PoolEntry {
    pub fn availability(&self) -> i64 {
        self.total - self.reserved - self.consumed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Distribution {
    pub id: i64,
    pub contest_id: i64,
    pub participant_id: i64,
    pub position: i64,
    pub prize_kind: String,
    pub prize_json: String,
    pub status: String,
    pub attempts: i64,
    pub pool_reserved: bool,
    pub last_attempt_at: Option<i64>,
    pub sent_at: Option<i64>,
    pub error: Option<String>,
}

impl Distribution {
    pub fn status_enum(&self) -> Option<DistributionStatus> {
        DistributionStatus::parse(&self.status)
    }

    pub fn prize(&self) -> Result<Prize> {
        serde_json::from_str(&self.prize_json).map_err(EngineError::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SecondChanceEntry {
    pub contest_id: i64,
    pub participant_id: i64,
    pub proof: String,
    pub is_winner: bool,
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
