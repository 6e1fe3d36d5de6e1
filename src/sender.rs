//! External delivery boundaries — the messaging-platform gift relay and the
//! blockchain transfer service.
//!
//! Both are injected into the distribution engine as traits so tests can
//! substitute recording fakes. The HTTP implementations share one
//! [`reqwest::Client`] whose timeout bounds every send call; a timed-out
//! send surfaces as an error and consumes one distribution attempt.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::errors::{EngineError, Result};

/// Expected length of a user-friendly wallet address.
const WALLET_ADDRESS_LEN: usize = 48;

#[allow(async_fn_in_trait)]
pub trait GiftSender {
    /// Deliver one gift unit to a participant. `gift_ref` is the external
    /// catalog id for both pooled and on-demand sends.
    async fn send_gift(&self, recipient_id: i64, gift_ref: &str, message: &str) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait ChainTransfer {
    /// Local, synchronous format check. Never touches the network.
    fn validate_address(&self, address: &str) -> bool;

    async fn transfer(&self, address: &str, amount: i64, memo: &str) -> Result<()>;
}

/// Format check for user-friendly wallet addresses: 48 base64url characters.
pub fn is_wallet_address(address: &str) -> bool {
    address.len() == WALLET_ADDRESS_LEN
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ─────────────────────────────────────────────────────────
// Relay response shape
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RelayResponse {
    ok: bool,
    error: Option<String>,
}

// ─────────────────────────────────────────────────────────
// HTTP implementations
// ─────────────────────────────────────────────────────────

pub struct HttpGiftSender {
    client: Client,
    url: String,
}

impl HttpGiftSender {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

impl GiftSender for HttpGiftSender {
    async fn send_gift(&self, recipient_id: i64, gift_ref: &str, message: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "recipient_id": recipient_id,
                "gift_ref": gift_ref,
                "message": message,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!("Gift relay returned {status} for participant {recipient_id}");
            return Err(EngineError::SendFailed(format!(
                "gift relay returned {status}"
            )));
        }

        let body: RelayResponse = resp.json().await?;
        if body.ok {
            Ok(())
        } else {
            Err(EngineError::SendFailed(
                body.error
                    .unwrap_or_else(|| "unspecified relay error".to_string()),
            ))
        }
    }
}

pub struct HttpChainTransfer {
    client: Client,
    url: String,
}

impl HttpChainTransfer {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

impl ChainTransfer for HttpChainTransfer {
    fn validate_address(&self, address: &str) -> bool {
        is_wallet_address(address)
    }

    async fn transfer(&self, address: &str, amount: i64, memo: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "address": address,
                "amount": amount,
                "memo": memo,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!("Transfer service returned {status}");
            return Err(EngineError::SendFailed(format!(
                "transfer service returned {status}"
            )));
        }

        let body: RelayResponse = resp.json().await?;
        if body.ok {
            Ok(())
        } else {
            Err(EngineError::SendFailed(
                body.error
                    .unwrap_or_else(|| "unspecified transfer error".to_string()),
            ))
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_address() {
        assert!(is_wallet_address(
            "UQBFzLt6Hg2PK-0y1Ss4uDMZ3ft7fW8cbkEJFGLx9a0_Zm4p"
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_wallet_address("UQBFzLt6"));
        assert!(!is_wallet_address(""));
    }

    #[test]
    fn rejects_illegal_characters() {
        assert!(!is_wallet_address(
            "UQBFzLt6Hg2PK+0y1Ss4uDMZ3ft7fW8cbkEJFGLx9a0/Zm4p"
        ));
        assert!(!is_wallet_address(
            "UQBFzLt6Hg2PK 0y1Ss4uDMZ3ft7fW8cbkEJFGLx9a0 Zm4p"
        ));
    }
}
