//! Application configuration loaded from environment variables.

use crate::errors::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) the scheduler scans for due contests
    pub tick_interval_secs: u64,
    /// Pause between consecutive prize sends within one batch (ms)
    pub send_pacing_ms: u64,
    /// Delay between primary completion and the second-chance draw (seconds)
    pub second_chance_delay_secs: i64,
    /// Endpoint of the messaging-platform gift relay
    pub gift_api_url: String,
    /// Endpoint of the blockchain transfer service
    pub chain_api_url: String,
    /// Timeout for a single external send call (seconds)
    pub send_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./contest_engine.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| EngineError::Config("Invalid API_PORT".to_string()))?,
            tick_interval_secs: env_var("TICK_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| EngineError::Config("Invalid TICK_INTERVAL_SECS".to_string()))?,
            send_pacing_ms: env_var("SEND_PACING_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| EngineError::Config("Invalid SEND_PACING_MS".to_string()))?,
            second_chance_delay_secs: env_var("SECOND_CHANCE_DELAY_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| {
                    EngineError::Config("Invalid SECOND_CHANCE_DELAY_SECS".to_string())
                })?,
            gift_api_url: env_var("GIFT_API_URL").map_err(|_| {
                EngineError::Config("GIFT_API_URL environment variable is required".to_string())
            })?,
            chain_api_url: env_var("CHAIN_API_URL").map_err(|_| {
                EngineError::Config("CHAIN_API_URL environment variable is required".to_string())
            })?,
            send_timeout_secs: env_var("SEND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| EngineError::Config("Invalid SEND_TIMEOUT_SECS".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| EngineError::Config(format!("Missing env var: {key}")))
}
