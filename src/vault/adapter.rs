//! Yield Pool Adapters
//!
//! The vault only depends on this shape: a pool reports a supply rate and
//! a held balance, and accepts deposits/withdrawals of the vault asset.
//! Concrete pool mechanics (lending markets, AMM strategies) live outside
//! the system; `SimulatedPool` stands in for them in the binary and tests.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::LogEvent;

/// Capability surface of an external yield source.
///
/// Adapters are assumed fee-free and instantaneous; `withdraw` clamps to
/// the held balance and reports what actually moved so callers never
/// observe a partial failure.
pub trait YieldAdapter: Send + Sync {
    /// On-ledger address of the pool (used for event subscriptions).
    fn address(&self) -> &str;

    /// Current supply rate in basis points.
    fn current_rate(&self) -> u64;

    /// Assets currently held by this pool on behalf of the vault.
    fn total_held(&self) -> u128;

    /// Accept `amount` of the vault asset.
    fn deposit(&self, amount: u128);

    /// Release up to `amount`, clamped to the held balance.
    /// Returns the amount actually withdrawn.
    fn withdraw(&self, amount: u128) -> u128;
}

/// In-process pool with a settable rate.
///
/// Rate changes publish a `RateUpdated` log onto the origin-ledger event
/// bus, which is what wakes the reactive automation downstream.
pub struct SimulatedPool {
    address: String,
    chain_id: u64,
    rate_bps: RwLock<u64>,
    held: RwLock<u128>,
    logs: Option<broadcast::Sender<LogEvent>>,
}

impl SimulatedPool {
    pub fn new(address: &str, rate_bps: u64) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_lowercase(),
            chain_id: 0,
            rate_bps: RwLock::new(rate_bps),
            held: RwLock::new(0),
            logs: None,
        })
    }

    /// Pool wired to an origin-ledger log bus.
    pub fn with_log_bus(
        address: &str,
        rate_bps: u64,
        chain_id: u64,
        logs: broadcast::Sender<LogEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_lowercase(),
            chain_id,
            rate_bps: RwLock::new(rate_bps),
            held: RwLock::new(0),
            logs: Some(logs),
        })
    }

    /// Update the supply rate and emit `RateUpdated`.
    pub fn set_supply_rate(&self, rate_bps: u64) {
        *self.rate_bps.write() = rate_bps;
        debug!(pool = %self.address, rate_bps, "supply rate updated");
        if let Some(logs) = &self.logs {
            // A send error just means nobody is listening yet.
            let _ = logs.send(LogEvent::rate_updated(self.chain_id, &self.address, rate_bps));
        }
    }
}

impl YieldAdapter for SimulatedPool {
    fn address(&self) -> &str {
        &self.address
    }

    fn current_rate(&self) -> u64 {
        *self.rate_bps.read()
    }

    fn total_held(&self) -> u128 {
        *self.held.read()
    }

    fn deposit(&self, amount: u128) {
        *self.held.write() += amount;
    }

    fn withdraw(&self, amount: u128) -> u128 {
        let mut held = self.held.write();
        let moved = amount.min(*held);
        *held -= moved;
        moved
    }
}
