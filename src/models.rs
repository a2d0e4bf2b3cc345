use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keccak selector for `RateUpdated(uint256)`, the pool-side log the
/// automation subscribes to on the origin ledger.
pub const RATE_UPDATED_SELECTOR: &str =
    "0xe65c987b2e4668e09ba867026921588005b2b2063607a1e7e7d91683c8f91b7b";

/// Default origin ledger (Sepolia) chain id.
pub const DEFAULT_ORIGIN_CHAIN_ID: u64 = 11_155_111;

/// An identity on either ledger (owner, relayer, depositor, contract).
///
/// Stored lowercase so authorization checks are insensitive to how the
/// caller formats an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A log record observed on the origin ledger.
///
/// The payload carries whatever the emitter put there (e.g. the new rate),
/// but consumers must re-read live state instead of trusting it: delivery
/// is at-least-once and may lag the chain by an arbitrary window.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub chain_id: u64,
    pub address: String,
    pub selector: String,
    pub topics: Vec<String>,
    pub data: Vec<u8>,
    pub ts: i64,
}

impl LogEvent {
    pub fn rate_updated(chain_id: u64, address: &str, rate_bps: u64) -> Self {
        Self {
            chain_id,
            address: address.to_lowercase(),
            selector: RATE_UPDATED_SELECTOR.to_string(),
            topics: Vec::new(),
            data: rate_bps.to_le_bytes().to_vec(),
            ts: Utc::now().timestamp(),
        }
    }
}

/// Operator-visible record of one automation step.
///
/// `Triggered` marks the decision, `Executed` the structured outcome that
/// crossed back from the destination ledger. Monitors distinguish
/// "nothing to do", "attempted and failed", and "succeeded" from these
/// records alone.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionEvent {
    Triggered {
        action: String,
        from_index: u32,
        to_index: u32,
        amount: u128,
        rate_gap_bps: u64,
    },
    Executed {
        label: String,
        success: bool,
        /// Hex-encoded opaque payload returned by the hub, if any.
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ActionEvent {
    pub fn is_success(&self) -> bool {
        match self {
            ActionEvent::Triggered { .. } => true,
            ActionEvent::Executed { success, .. } => *success,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub asset: String,
    pub yield_threshold_bps: u64,
    pub prediction_score_threshold: u64,
    pub origin_chain_id: u64,
    pub simulate_rates: bool,
    pub simulate_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("YIELDLOOP_DATABASE_PATH")
            .unwrap_or_else(|_| "./yieldloop.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let asset = std::env::var("ASSET").unwrap_or_else(|_| "USDC".to_string());

        let yield_threshold_bps = std::env::var("YIELD_THRESHOLD_BPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let prediction_score_threshold = std::env::var("PREDICTION_SCORE_THRESHOLD")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500);

        let origin_chain_id = std::env::var("ORIGIN_CHAIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ORIGIN_CHAIN_ID);

        let simulate_rates = std::env::var("SIMULATE_RATES")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        let simulate_interval_secs = std::env::var("SIMULATE_INTERVAL_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        Ok(Self {
            database_path,
            port,
            asset,
            yield_threshold_bps,
            prediction_score_threshold,
            origin_chain_id,
            simulate_rates,
            simulate_interval_secs,
        })
    }
}
