//! Wire Format for Cross-Ledger Action Params
//!
//! The hub receives `(action_type, params)` where params are opaque bytes
//! encoded by the originating ledger. Fixed little-endian layouts keep
//! decoding trivial and make malformed payloads detectable by size alone.

/// Action type dispatched to `Vault::move_between_pools`.
pub const ACTION_REBALANCE: &str = "REBALANCE";

/// Action type supplying hub-held funds to the configured lending pool.
pub const ACTION_LEND: &str = "LEND";

/// Exact encoded size of [`RebalanceParams`].
/// 4 + 4 + 16 = 24 bytes
pub const REBALANCE_PARAMS_SIZE: usize = 24;

/// Minimum encoded size of [`LendParams`] (amount + 1-byte asset).
pub const LEND_PARAMS_MIN_SIZE: usize = 17;

/// Errors during action param decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    InvalidSize(usize),
    BadAssetUtf8,
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSize(s) => write!(f, "invalid params size: {}", s),
            Self::BadAssetUtf8 => write!(f, "asset id is not valid utf-8"),
        }
    }
}

impl std::error::Error for WireError {}

/// Params for `REBALANCE`: move `amount` from one pool index to another.
///
/// Layout (little-endian):
/// ```text
/// Offset  Size  Field
/// 0       4     from_index
/// 4       4     to_index
/// 8       16    amount
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceParams {
    pub from_index: u32,
    pub to_index: u32,
    pub amount: u128,
}

impl RebalanceParams {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(REBALANCE_PARAMS_SIZE);
        buf.extend_from_slice(&self.from_index.to_le_bytes());
        buf.extend_from_slice(&self.to_index.to_le_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != REBALANCE_PARAMS_SIZE {
            return Err(WireError::InvalidSize(buf.len()));
        }
        let from_index = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let to_index = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let amount = u128::from_le_bytes(buf[8..24].try_into().unwrap());
        Ok(Self {
            from_index,
            to_index,
            amount,
        })
    }
}

/// Params for `LEND`: supply `amount` of `asset` from hub-held funds.
///
/// Layout (little-endian): 16-byte amount followed by the asset id bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendParams {
    pub amount: u128,
    pub asset: String,
}

impl LendParams {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.asset.len());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(self.asset.as_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < LEND_PARAMS_MIN_SIZE {
            return Err(WireError::InvalidSize(buf.len()));
        }
        let amount = u128::from_le_bytes(buf[0..16].try_into().unwrap());
        let asset = std::str::from_utf8(&buf[16..])
            .map_err(|_| WireError::BadAssetUtf8)?
            .to_string();
        Ok(Self { amount, asset })
    }
}
