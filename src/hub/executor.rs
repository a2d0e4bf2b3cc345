//! Remote Execution Hub
//!
//! Destination-ledger entry point for automated callbacks. A single
//! configured relayer principal is trusted at a time; everyone else is
//! rejected before any dispatch happens. Dispatch failures are reported
//! as structured outcomes, never thrown: the originating side lives on a
//! different execution context and cannot catch an exception from here.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::wire::{LendParams, RebalanceParams, ACTION_LEND, ACTION_REBALANCE};
use crate::models::Principal;
use crate::vault::{SharedVault, VaultError, YieldAdapter};

/// Hard failures local to the hub's own execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    Unauthorized,
    VaultNotSet,
    LendingPoolNotSet,
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "caller is not the reactive network"),
            Self::VaultNotSet => write!(f, "vault not set"),
            Self::LendingPoolNotSet => write!(f, "lending pool not set"),
        }
    }
}

impl std::error::Error for HubError {}

/// Structured result of one callback. This is the only thing that travels
/// back across the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: String,
    /// Whether the callback passed authentication and was handled.
    pub accepted: bool,
    pub success: bool,
    pub data: Vec<u8>,
    pub reason: Option<String>,
}

impl ActionOutcome {
    pub fn ok(action: &str, data: Vec<u8>) -> Self {
        Self {
            action: action.to_string(),
            accepted: true,
            success: true,
            data,
            reason: None,
        }
    }

    pub fn failed(action: &str, reason: String) -> Self {
        Self {
            action: action.to_string(),
            accepted: true,
            success: false,
            data: Vec::new(),
            reason: Some(reason),
        }
    }

    /// Unknown action types are handled-but-unsuccessful, mirroring the
    /// `ActionExecuted(actionType, false, "")` record the origin side
    /// watches for.
    pub fn unknown(action: &str) -> Self {
        Self {
            action: action.to_string(),
            accepted: true,
            success: false,
            data: Vec::new(),
            reason: None,
        }
    }

    pub fn rejected(action: &str, reason: String) -> Self {
        Self {
            action: action.to_string(),
            accepted: false,
            success: false,
            data: Vec::new(),
            reason: Some(reason),
        }
    }
}

/// The hub holds no funds in steady state; anything that lands here by
/// mistake is tracked per asset until the owner recovers it.
pub struct RemoteHub {
    owner: Principal,
    /// Principal the hub itself uses when calling into the vault.
    identity: Principal,
    reactive_network: RwLock<Option<Principal>>,
    vault: RwLock<Option<SharedVault>>,
    lending_pool: RwLock<Option<Arc<dyn YieldAdapter>>>,
    held_funds: RwLock<HashMap<String, u128>>,
}

impl RemoteHub {
    pub fn new(owner: Principal, identity: Principal) -> Arc<Self> {
        Arc::new(Self {
            owner,
            identity,
            reactive_network: RwLock::new(None),
            vault: RwLock::new(None),
            lending_pool: RwLock::new(None),
            held_funds: RwLock::new(HashMap::new()),
        })
    }

    pub fn identity(&self) -> &Principal {
        &self.identity
    }

    fn require_owner(&self, caller: &Principal) -> Result<(), HubError> {
        if *caller != self.owner {
            return Err(HubError::Unauthorized);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Owner configuration
    // ------------------------------------------------------------------

    pub fn set_vault(&self, caller: &Principal, vault: SharedVault) -> Result<(), HubError> {
        self.require_owner(caller)?;
        *self.vault.write() = Some(vault);
        Ok(())
    }

    pub fn set_reactive_network(
        &self,
        caller: &Principal,
        relayer: Principal,
    ) -> Result<(), HubError> {
        self.require_owner(caller)?;
        info!(relayer = %relayer, "reactive network updated");
        *self.reactive_network.write() = Some(relayer);
        Ok(())
    }

    pub fn set_lending_pool(
        &self,
        caller: &Principal,
        pool: Arc<dyn YieldAdapter>,
    ) -> Result<(), HubError> {
        self.require_owner(caller)?;
        *self.lending_pool.write() = Some(pool);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Callback surface
    // ------------------------------------------------------------------

    /// Authenticate and dispatch one cross-ledger action.
    ///
    /// The authorized relayer is snapshotted at call time, so an owner
    /// re-pointing `set_reactive_network` mid-flight does not disturb a
    /// callback already being processed.
    pub fn execute_action(
        &self,
        caller: &Principal,
        action: &str,
        params: &[u8],
    ) -> Result<ActionOutcome, HubError> {
        let authorized = self.reactive_network.read().clone();
        match authorized {
            Some(relayer) if relayer == *caller => {}
            _ => {
                warn!(caller = %caller, action, "callback rejected");
                return Err(HubError::Unauthorized);
            }
        }

        match action {
            ACTION_REBALANCE => self.dispatch_rebalance(params),
            ACTION_LEND => self.dispatch_lend(params),
            other => {
                warn!(action = other, "unknown action type");
                Ok(ActionOutcome::unknown(other))
            }
        }
    }

    fn dispatch_rebalance(&self, params: &[u8]) -> Result<ActionOutcome, HubError> {
        let decoded = match RebalanceParams::decode(params) {
            Ok(p) => p,
            Err(e) => return Ok(ActionOutcome::failed(ACTION_REBALANCE, e.to_string())),
        };
        let vault = self.vault.read().clone().ok_or(HubError::VaultNotSet)?;

        let result = vault.write().move_between_pools(
            &self.identity,
            decoded.from_index as usize,
            decoded.to_index as usize,
            decoded.amount,
        );
        match result {
            Ok(moved) => Ok(ActionOutcome::ok(
                ACTION_REBALANCE,
                moved.to_le_bytes().to_vec(),
            )),
            Err(e) => Ok(ActionOutcome::failed(ACTION_REBALANCE, e.to_string())),
        }
    }

    fn dispatch_lend(&self, params: &[u8]) -> Result<ActionOutcome, HubError> {
        let pool = self
            .lending_pool
            .read()
            .clone()
            .ok_or(HubError::LendingPoolNotSet)?;
        let decoded = match LendParams::decode(params) {
            Ok(p) => p,
            Err(e) => return Ok(ActionOutcome::failed(ACTION_LEND, e.to_string())),
        };

        let mut held = self.held_funds.write();
        let balance = held.get(&decoded.asset).copied().unwrap_or(0);
        if balance < decoded.amount {
            return Ok(ActionOutcome::failed(
                ACTION_LEND,
                VaultError::InsufficientBalance.to_string(),
            ));
        }
        held.insert(decoded.asset.clone(), balance - decoded.amount);
        drop(held);

        pool.deposit(decoded.amount);
        info!(asset = %decoded.asset, amount = decoded.amount, "lend dispatched");
        Ok(ActionOutcome::ok(ACTION_LEND, Vec::new()))
    }

    // ------------------------------------------------------------------
    // Stray funds
    // ------------------------------------------------------------------

    /// Record funds that arrived at the hub outside the protocol.
    pub fn receive_funds(&self, asset: &str, amount: u128) {
        *self.held_funds.write().entry(asset.to_string()).or_insert(0) += amount;
    }

    pub fn held_balance(&self, asset: &str) -> u128 {
        self.held_funds.read().get(asset).copied().unwrap_or(0)
    }

    /// Owner escape hatch: sweep the full balance of `asset` to `to`.
    /// Not part of the steady-state protocol.
    pub fn recover_funds(
        &self,
        caller: &Principal,
        asset: &str,
        to: &Principal,
    ) -> Result<u128, HubError> {
        self.require_owner(caller)?;
        let amount = self.held_funds.write().remove(asset).unwrap_or(0);
        info!(asset, amount, to = %to, "stray funds recovered");
        Ok(amount)
    }
}
