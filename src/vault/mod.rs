//! Vault Module - Pooled Deposits & Rebalancing
//!
//! This module handles:
//! 1. Depositor claims and custody of the pooled asset
//! 2. The append-only yield pool registry
//! 3. The threshold policy that decides when capital should move
//!
//! Architecture:
//! - Users deposit a single asset; fresh deposits land in pool 0
//! - Pools report a supply rate (bps) and a held balance
//! - `move_between_pools` is the only way value changes pools

pub mod adapter;
pub mod engine;
pub mod policy;

pub use adapter::{SimulatedPool, YieldAdapter};
pub use engine::{SharedVault, VaultError, VaultEvent, YieldVault};
pub use policy::{
    evaluate, NoActionReason, PolicyDecision, PoolSnapshot, RebalanceIntent,
    DEFAULT_YIELD_THRESHOLD_BPS,
};
