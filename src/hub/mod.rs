//! Remote Execution Hub - Destination-Ledger Side
//!
//! The hub is the only privileged entry point the automation can reach on
//! the destination ledger. Callbacks arrive over an unreliable delivery
//! channel (modeled as an mpsc here), are authenticated against the one
//! configured relayer principal, and always answer with a structured
//! outcome instead of an error the remote caller could never catch.

pub mod executor;
pub mod wire;

pub use executor::{ActionOutcome, HubError, RemoteHub};
pub use wire::{
    LendParams, RebalanceParams, WireError, ACTION_LEND, ACTION_REBALANCE,
    LEND_PARAMS_MIN_SIZE, REBALANCE_PARAMS_SIZE,
};

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::Principal;

/// One callback in flight from the reactive ledger to the hub.
#[derive(Debug)]
pub struct RemoteCallback {
    pub caller: Principal,
    pub action: String,
    pub params: Vec<u8>,
    pub reply: oneshot::Sender<ActionOutcome>,
}

/// Origin-side handle for issuing callbacks. Carries the identity the
/// hub will authenticate; a misconfigured identity shows up as a
/// rejection outcome, not a transport error.
#[derive(Clone)]
pub struct CallbackClient {
    identity: Principal,
    tx: mpsc::Sender<RemoteCallback>,
}

impl CallbackClient {
    pub fn new(identity: Principal, tx: mpsc::Sender<RemoteCallback>) -> Self {
        Self { identity, tx }
    }

    pub async fn call(&self, action: &str, params: Vec<u8>) -> anyhow::Result<ActionOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RemoteCallback {
                caller: self.identity.clone(),
                action: action.to_string(),
                params,
                reply: reply_tx,
            })
            .await
            .context("hub delivery channel closed")?;
        reply_rx.await.context("hub dropped the callback")
    }
}

/// Drive the hub from its delivery channel until the channel closes.
///
/// Hard hub errors (rejection, missing configuration) are folded into a
/// rejection outcome on the reply path; the cross-ledger caller only ever
/// observes structured results.
pub fn spawn_remote_hub(
    hub: Arc<RemoteHub>,
    mut rx: mpsc::Receiver<RemoteCallback>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cb) = rx.recv().await {
            debug!(caller = %cb.caller, action = %cb.action, "callback received");
            let outcome = match hub.execute_action(&cb.caller, &cb.action, &cb.params) {
                Ok(outcome) => outcome,
                Err(e) => ActionOutcome::rejected(&cb.action, e.to_string()),
            };
            // Receiver gone means the origin side stopped waiting; the
            // action itself has already taken effect or not.
            let _ = cb.reply.send(outcome);
        }
        debug!("hub delivery channel closed");
    })
}
