//! Vault Allocation Engine
//!
//! Custody of pooled deposits plus the conservation primitive that moves
//! value between registered pools. Every mutation is one atomic call on
//! the origin ledger; the automation only ever reaches the vault through
//! `move_between_pools` via the remote hub.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::adapter::YieldAdapter;
use super::policy::PoolSnapshot;
use crate::models::Principal;

/// Hard failures for single-ledger vault calls.
///
/// These abort the call and reach the caller directly; only the hub's
/// structured outcomes travel across the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    InvalidAmount,
    InsufficientBalance,
    IndexOutOfBounds(usize),
    Unauthorized,
    Paused,
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "amount must be positive"),
            Self::InsufficientBalance => write!(f, "insufficient balance"),
            Self::IndexOutOfBounds(i) => write!(f, "adapter index {} out of bounds", i),
            Self::Unauthorized => write!(f, "caller not authorized"),
            Self::Paused => write!(f, "vault is paused"),
        }
    }
}

impl std::error::Error for VaultError {}

/// State-change notifications mirrored onto a broadcast channel so the
/// monitor surface and tests can observe vault activity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    Deposited { principal: Principal, amount: u128 },
    Withdrawn { principal: Principal, amount: u128 },
    AdapterAdded { index: usize, address: String },
    Rebalanced { from_index: usize, to_index: usize, amount: u128 },
    AuthorizationSet { principal: Principal, enabled: bool },
    PauseSet { paused: bool },
}

/// The allocation ledger: depositor claims, the append-only pool
/// registry, and the authorization list gating privileged moves.
///
/// Invariant at every quiescent point:
/// `idle_cash + sum(adapter.total_held()) == total_assets()`.
pub struct YieldVault {
    asset: String,
    owner: Principal,
    adapters: Vec<Arc<dyn YieldAdapter>>,
    authorized: HashMap<Principal, bool>,
    claims: HashMap<Principal, u128>,
    /// Deposits received before any pool was registered.
    idle_cash: u128,
    total_assets: u128,
    paused: bool,
    events: Option<broadcast::Sender<VaultEvent>>,
}

/// Vault shared between the origin ledger's entry points. Each call takes
/// the lock for its full duration, which is the single-writer atomicity
/// the execution model guarantees per state-changing call.
pub type SharedVault = Arc<parking_lot::RwLock<YieldVault>>;

impl YieldVault {
    pub fn new(asset: &str, owner: Principal) -> Self {
        Self {
            asset: asset.to_string(),
            owner,
            adapters: Vec::new(),
            authorized: HashMap::new(),
            claims: HashMap::new(),
            idle_cash: 0,
            total_assets: 0,
            paused: false,
            events: None,
        }
    }

    pub fn with_event_sink(mut self, events: broadcast::Sender<VaultEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn into_shared(self) -> SharedVault {
        Arc::new(parking_lot::RwLock::new(self))
    }

    fn emit(&self, ev: VaultEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(ev);
        }
    }

    fn require_owner(&self, caller: &Principal) -> Result<(), VaultError> {
        if *caller != self.owner {
            return Err(VaultError::Unauthorized);
        }
        Ok(())
    }

    fn require_privileged(&self, caller: &Principal) -> Result<(), VaultError> {
        if *caller == self.owner || self.authorized.get(caller).copied().unwrap_or(false) {
            return Ok(());
        }
        Err(VaultError::Unauthorized)
    }

    // ------------------------------------------------------------------
    // Deposits & withdrawals
    // ------------------------------------------------------------------

    /// Credit `caller` and place the funds. Fresh deposits land in the
    /// first registered pool; with no pools yet they sit as idle cash.
    pub fn deposit(&mut self, caller: &Principal, amount: u128) -> Result<(), VaultError> {
        if self.paused {
            return Err(VaultError::Paused);
        }
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        *self.claims.entry(caller.clone()).or_insert(0) += amount;
        self.total_assets += amount;

        match self.adapters.first() {
            Some(first) => first.deposit(amount),
            None => self.idle_cash += amount,
        }

        info!(principal = %caller, amount, asset = %self.asset, "deposit");
        self.emit(VaultEvent::Deposited {
            principal: caller.clone(),
            amount,
        });
        Ok(())
    }

    /// Return funds to `caller`, drawing idle cash first and then pools
    /// in registration order. Withdrawals stay open while paused so
    /// depositors are never trapped.
    pub fn withdraw(&mut self, caller: &Principal, amount: u128) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let claim = self.claims.get(caller).copied().unwrap_or(0);
        if claim < amount {
            return Err(VaultError::InsufficientBalance);
        }
        if self.liquid_assets() < amount {
            return Err(VaultError::InsufficientBalance);
        }

        let mut remaining = amount;
        let from_cash = remaining.min(self.idle_cash);
        self.idle_cash -= from_cash;
        remaining -= from_cash;
        for adapter in &self.adapters {
            if remaining == 0 {
                break;
            }
            remaining -= adapter.withdraw(remaining);
        }
        debug_assert_eq!(remaining, 0);

        let new_claim = claim - amount;
        if new_claim == 0 {
            self.claims.remove(caller);
        } else {
            self.claims.insert(caller.clone(), new_claim);
        }
        self.total_assets -= amount;

        info!(principal = %caller, amount, "withdraw");
        self.emit(VaultEvent::Withdrawn {
            principal: caller.clone(),
            amount,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pool registry
    // ------------------------------------------------------------------

    /// Append a pool; its index is stable for the life of the vault.
    /// Returns the assigned index. No removal exists.
    pub fn add_adapter(
        &mut self,
        caller: &Principal,
        adapter: Arc<dyn YieldAdapter>,
    ) -> Result<usize, VaultError> {
        self.require_owner(caller)?;
        let index = self.adapters.len();
        let address = adapter.address().to_string();
        self.adapters.push(adapter);
        info!(index, address = %address, "adapter registered");
        self.emit(VaultEvent::AdapterAdded { index, address });
        Ok(index)
    }

    /// Move idle vault cash into a specific pool.
    pub fn deposit_to_adapter(
        &mut self,
        caller: &Principal,
        index: usize,
        amount: u128,
    ) -> Result<(), VaultError> {
        self.require_privileged(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let adapter = self
            .adapters
            .get(index)
            .ok_or(VaultError::IndexOutOfBounds(index))?;
        if self.idle_cash < amount {
            return Err(VaultError::InsufficientBalance);
        }
        self.idle_cash -= amount;
        adapter.deposit(amount);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rebalance primitive
    // ------------------------------------------------------------------

    /// Withdraw from one pool and deposit into another in a single atomic
    /// step. The requested amount is clamped to the source pool's held
    /// balance: a concurrent external withdrawal shrinks the move rather
    /// than failing it. Returns the amount actually moved.
    pub fn move_between_pools(
        &mut self,
        caller: &Principal,
        from_index: usize,
        to_index: usize,
        amount: u128,
    ) -> Result<u128, VaultError> {
        self.require_privileged(caller)?;
        if self.paused {
            return Err(VaultError::Paused);
        }
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        if from_index >= self.adapters.len() {
            return Err(VaultError::IndexOutOfBounds(from_index));
        }
        if to_index >= self.adapters.len() {
            return Err(VaultError::IndexOutOfBounds(to_index));
        }

        let moved = self.adapters[from_index].withdraw(amount);
        self.adapters[to_index].deposit(moved);

        if moved < amount {
            warn!(
                from_index,
                to_index, requested = amount, moved, "rebalance clamped to source balance"
            );
        }
        info!(from_index, to_index, moved, "rebalanced");
        self.emit(VaultEvent::Rebalanced {
            from_index,
            to_index,
            amount: moved,
        });
        Ok(moved)
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn set_authorization(
        &mut self,
        caller: &Principal,
        principal: Principal,
        enabled: bool,
    ) -> Result<(), VaultError> {
        self.require_owner(caller)?;
        self.authorized.insert(principal.clone(), enabled);
        self.emit(VaultEvent::AuthorizationSet { principal, enabled });
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Principal,
        new_owner: Principal,
    ) -> Result<(), VaultError> {
        self.require_owner(caller)?;
        info!(old = %self.owner, new = %new_owner, "vault ownership transferred");
        self.owner = new_owner;
        Ok(())
    }

    /// Pausing blocks deposits and rebalances; withdrawals stay open.
    pub fn pause(&mut self, caller: &Principal) -> Result<(), VaultError> {
        self.require_owner(caller)?;
        self.paused = true;
        self.emit(VaultEvent::PauseSet { paused: true });
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Principal) -> Result<(), VaultError> {
        self.require_owner(caller)?;
        self.paused = false;
        self.emit(VaultEvent::PauseSet { paused: false });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_authorized(&self, principal: &Principal) -> bool {
        *principal == self.owner || self.authorized.get(principal).copied().unwrap_or(false)
    }

    pub fn total_assets(&self) -> u128 {
        self.total_assets
    }

    pub fn idle_cash(&self) -> u128 {
        self.idle_cash
    }

    pub fn claim_of(&self, principal: &Principal) -> u128 {
        self.claims.get(principal).copied().unwrap_or(0)
    }

    pub fn adapters_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn adapter(&self, index: usize) -> Option<Arc<dyn YieldAdapter>> {
        self.adapters.get(index).cloned()
    }

    /// Idle cash plus everything currently held across pools.
    pub fn liquid_assets(&self) -> u128 {
        self.idle_cash
            + self
                .adapters
                .iter()
                .map(|a| a.total_held())
                .sum::<u128>()
    }

    /// Fresh per-pool rates and balances, read at call time. Never cached:
    /// the policy engine must see the ledger as it is now, not as it was
    /// when some event fired.
    pub fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        self.adapters
            .iter()
            .enumerate()
            .map(|(index, a)| PoolSnapshot {
                index,
                rate_bps: a.current_rate(),
                balance: a.total_held(),
            })
            .collect()
    }
}
