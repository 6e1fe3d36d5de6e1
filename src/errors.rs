//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Contest {0} not found")]
    ContestNotFound(i64),

    #[error("Contest {0} is not accepting activity")]
    ContestNotAcceptingActivity(i64),

    #[error("Invalid contest status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Expected {expected} prizes for {expected} winners, got {got}")]
    PrizeCountMismatch { expected: i64, got: i64 },

    #[error("Winners count must be between 1 and 100, got {0}")]
    InvalidWinnersCount(i64),

    #[error("A boost is already active for this participant")]
    BoostAlreadyActive,

    #[error("Quantity must be strictly positive")]
    InvalidQuantity,

    #[error("Ledger invariant violated for gift {0}: insufficient reserved balance")]
    InsufficientReserved(String),

    #[error("Distribution {0} not found")]
    DistributionNotFound(i64),

    #[error("Distribution {0} has exhausted its retry budget")]
    AttemptsExhausted(i64),

    #[error("No wallet address on file for participant {0}")]
    WalletMissing(i64),

    #[error("Malformed wallet address: {0}")]
    InvalidAddress(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl EngineError {
    /// Precondition failures are surfaced to the caller without mutating
    /// state and are never retried automatically.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ContestNotFound(_)
                | Self::ContestNotAcceptingActivity(_)
                | Self::InvalidTransition { .. }
                | Self::PrizeCountMismatch { .. }
                | Self::InvalidWinnersCount(_)
                | Self::BoostAlreadyActive
                | Self::InvalidQuantity
                | Self::DistributionNotFound(_)
                | Self::AttemptsExhausted(_)
                | Self::WalletMissing(_)
                | Self::InvalidAddress(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
