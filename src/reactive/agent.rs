//! Reactive Rebalancer Agent
//!
//! Event-driven replacement for polling the pools. The relay delivers
//! matching origin-ledger logs; the agent re-reads live rates and
//! balances, runs the threshold policy, and on an intent issues the
//! cross-ledger `REBALANCE` callback. Duplicate or reordered deliveries
//! are harmless: once funds sit in the best pool, re-evaluation is a
//! natural no-op, so idempotency needs no event dedup.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::{CallbackClient, RebalanceParams, ACTION_REBALANCE};
use crate::models::{ActionEvent, LogEvent, Principal};
use crate::oracle::PredictionOracle;
use crate::reactive::journal::{ActionJournal, ActionRecord};
use crate::vault::{evaluate, PolicyDecision, SharedVault, VaultError};

/// Outcome labels the operator-facing monitor keys on.
pub const LABEL_REBALANCE_SUCCESS: &str = "Rebalance Success";
pub const LABEL_REBALANCE_FAILED: &str = "Rebalance Failed";
pub const LABEL_NO_REBALANCE: &str = "No Rebalance Needed";

#[derive(Debug, Clone)]
pub struct RebalancerConfig {
    pub yield_threshold_bps: u64,
    pub prediction_score_threshold: u64,
    /// Fixed demo target used when a prediction fires.
    pub prediction_move: RebalanceParams,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            yield_threshold_bps: crate::vault::DEFAULT_YIELD_THRESHOLD_BPS,
            prediction_score_threshold: 500,
            prediction_move: RebalanceParams {
                from_index: 0,
                to_index: 1,
                amount: 100,
            },
        }
    }
}

pub struct ReactiveRebalancer {
    owner: Principal,
    vault: SharedVault,
    threshold_bps: AtomicU64,
    prediction_score_threshold: u64,
    prediction_move: RebalanceParams,
    callbacks: CallbackClient,
    actions: broadcast::Sender<ActionEvent>,
    journal: Option<ActionJournal>,
    oracle: Option<Arc<dyn PredictionOracle>>,
}

impl ReactiveRebalancer {
    pub fn new(
        owner: Principal,
        vault: SharedVault,
        callbacks: CallbackClient,
        config: RebalancerConfig,
    ) -> Self {
        let (actions, _) = broadcast::channel(256);
        Self {
            owner,
            vault,
            threshold_bps: AtomicU64::new(config.yield_threshold_bps),
            prediction_score_threshold: config.prediction_score_threshold,
            prediction_move: config.prediction_move,
            callbacks,
            actions,
            journal: None,
            oracle: None,
        }
    }

    pub fn with_journal(mut self, journal: ActionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn PredictionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn subscribe_actions(&self) -> broadcast::Receiver<ActionEvent> {
        self.actions.subscribe()
    }

    pub fn yield_threshold(&self) -> u64 {
        self.threshold_bps.load(Ordering::Relaxed)
    }

    /// Owner-only: the single policy tunable, read on every evaluation.
    pub fn set_yield_threshold(&self, caller: &Principal, bps: u64) -> Result<(), VaultError> {
        if *caller != self.owner {
            return Err(VaultError::Unauthorized);
        }
        info!(bps, "yield threshold updated");
        self.threshold_bps.store(bps, Ordering::Relaxed);
        Ok(())
    }

    async fn record(&self, ev: ActionEvent) -> ActionEvent {
        let _ = self.actions.send(ev.clone());
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.insert(&ActionRecord::from_event(&ev)).await {
                warn!(error = %e, "journal insert failed");
            }
        }
        ev
    }

    /// Evaluate the policy against a fresh snapshot and, if it produces
    /// an intent, dispatch the cross-ledger callback. Returns the final
    /// outcome record.
    pub async fn check_yield_and_rebalance(&self, amount_to_move: u128) -> Result<ActionEvent> {
        // Snapshot under the lock, then release before any await.
        let snapshot = self.vault.read().pool_snapshots();
        let threshold = self.yield_threshold();

        match evaluate(&snapshot, threshold, amount_to_move) {
            PolicyDecision::NoAction(reason) => {
                debug!(?reason, "no rebalance needed");
                Ok(self
                    .record(ActionEvent::Executed {
                        label: LABEL_NO_REBALANCE.to_string(),
                        success: true,
                        data: String::new(),
                        reason: None,
                    })
                    .await)
            }
            PolicyDecision::Rebalance(intent) => {
                info!(
                    from = intent.from_index,
                    to = intent.to_index,
                    amount = intent.amount,
                    gap_bps = intent.rate_gap_bps,
                    "rebalance triggered"
                );
                self.record(ActionEvent::Triggered {
                    action: ACTION_REBALANCE.to_string(),
                    from_index: intent.from_index as u32,
                    to_index: intent.to_index as u32,
                    amount: intent.amount,
                    rate_gap_bps: intent.rate_gap_bps,
                })
                .await;

                self.dispatch_rebalance(RebalanceParams {
                    from_index: intent.from_index as u32,
                    to_index: intent.to_index as u32,
                    amount: intent.amount,
                })
                .await
            }
        }
    }

    async fn dispatch_rebalance(&self, params: RebalanceParams) -> Result<ActionEvent> {
        let outcome = self.callbacks.call(ACTION_REBALANCE, params.encode()).await?;
        let ev = if outcome.success {
            ActionEvent::Executed {
                label: LABEL_REBALANCE_SUCCESS.to_string(),
                success: true,
                data: hex::encode(&outcome.data),
                reason: None,
            }
        } else {
            ActionEvent::Executed {
                label: LABEL_REBALANCE_FAILED.to_string(),
                success: false,
                data: hex::encode(&outcome.data),
                reason: outcome.reason,
            }
        };
        Ok(self.record(ev).await)
    }

    /// Best-effort prediction trigger. A verified score strictly above
    /// the configured threshold fires the fixed demo move; the vault
    /// still clamps and authorizes it like any other callback.
    pub async fn submit_prediction(
        &self,
        proof: &[u8],
        input: &[u8],
        output: &[u8],
    ) -> Result<ActionEvent> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| anyhow!("no prediction oracle configured"))?;
        oracle.verify(proof, input, output)?;

        if output.len() < 8 {
            return Err(anyhow!("prediction output too short: {} bytes", output.len()));
        }
        let score = u64::from_le_bytes(output[..8].try_into().unwrap());

        self.act_on_score(score).await
    }

    /// Poll the oracle directly, no proof involved. Same best-effort
    /// semantics as `submit_prediction`.
    pub async fn poll_prediction(&self, input: &[u8]) -> Result<ActionEvent> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| anyhow!("no prediction oracle configured"))?;
        let prediction = oracle.predict(input);
        debug!(
            score = prediction.score,
            confidence = prediction.confidence,
            "oracle polled"
        );
        self.act_on_score(prediction.score).await
    }

    async fn act_on_score(&self, score: u64) -> Result<ActionEvent> {
        if score <= self.prediction_score_threshold {
            debug!(score, "prediction below threshold");
            return Ok(self
                .record(ActionEvent::Executed {
                    label: LABEL_NO_REBALANCE.to_string(),
                    success: true,
                    data: String::new(),
                    reason: None,
                })
                .await);
        }

        info!(score, "prediction fired, dispatching demo rebalance");
        let params = self.prediction_move;
        self.record(ActionEvent::Triggered {
            action: ACTION_REBALANCE.to_string(),
            from_index: params.from_index,
            to_index: params.to_index,
            amount: params.amount,
            rate_gap_bps: 0,
        })
        .await;
        self.dispatch_rebalance(params).await
    }

    /// Handle one delivered log event. The payload rate is ignored on
    /// purpose: delivery lags the chain, so only a fresh read counts.
    pub async fn on_event(&self, ev: LogEvent) {
        debug!(address = %ev.address, chain_id = ev.chain_id, "rate event delivered");
        let amount_to_move = self.vault.read().total_assets();
        if let Err(e) = self.check_yield_and_rebalance(amount_to_move).await {
            warn!(error = %e, "event evaluation failed");
        }
    }
}

/// Drain the agent's inbox until the relay side closes it.
pub fn spawn_rebalancer(
    agent: Arc<ReactiveRebalancer>,
    mut inbox: mpsc::Receiver<LogEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ev) = inbox.recv().await {
            agent.on_event(ev).await;
        }
        debug!("agent inbox closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{spawn_remote_hub, RemoteHub};
    use crate::vault::{SimulatedPool, YieldAdapter, YieldVault};

    fn owner() -> Principal {
        Principal::new("0xowner")
    }

    struct Harness {
        agent: ReactiveRebalancer,
        vault: SharedVault,
        pool_a: Arc<SimulatedPool>,
        pool_b: Arc<SimulatedPool>,
    }

    fn harness(rate_a: u64, rate_b: u64) -> Harness {
        harness_opts(rate_a, rate_b, None)
    }

    fn harness_opts(
        rate_a: u64,
        rate_b: u64,
        oracle: Option<Arc<dyn crate::oracle::PredictionOracle>>,
    ) -> Harness {
        let relayer = Principal::new("0xreactive-network");
        let hub = RemoteHub::new(owner(), Principal::new("0xhub"));
        hub.set_reactive_network(&owner(), relayer.clone()).unwrap();

        let pool_a = SimulatedPool::new("0xpool-a", rate_a);
        let pool_b = SimulatedPool::new("0xpool-b", rate_b);

        let mut vault = YieldVault::new("USDC", owner());
        vault.add_adapter(&owner(), pool_a.clone()).unwrap();
        vault.add_adapter(&owner(), pool_b.clone()).unwrap();
        vault
            .set_authorization(&owner(), hub.identity().clone(), true)
            .unwrap();
        let vault = vault.into_shared();
        hub.set_vault(&owner(), vault.clone()).unwrap();

        let (cb_tx, cb_rx) = mpsc::channel(16);
        spawn_remote_hub(hub, cb_rx);

        let mut agent = ReactiveRebalancer::new(
            owner(),
            vault.clone(),
            CallbackClient::new(relayer, cb_tx),
            RebalancerConfig::default(),
        );
        if let Some(oracle) = oracle {
            agent = agent.with_oracle(oracle);
        }
        Harness {
            agent,
            vault,
            pool_a,
            pool_b,
        }
    }

    fn deposit(h: &Harness, amount: u128) {
        h.vault
            .write()
            .deposit(&Principal::new("0xuser"), amount)
            .unwrap();
    }

    #[tokio::test]
    async fn test_gap_below_threshold_is_noop() {
        let h = harness(500, 550);
        deposit(&h, 1000);

        let ev = h.agent.check_yield_and_rebalance(1000).await.unwrap();
        match ev {
            ActionEvent::Executed { label, success, .. } => {
                assert_eq!(label, LABEL_NO_REBALANCE);
                assert!(success);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.pool_a.total_held(), 1000);
        assert_eq!(h.pool_b.total_held(), 0);
    }

    #[tokio::test]
    async fn test_gap_above_threshold_moves_funds() {
        let h = harness(500, 1000);
        deposit(&h, 1000);

        let mut actions = h.agent.subscribe_actions();
        let ev = h.agent.check_yield_and_rebalance(1000).await.unwrap();
        match ev {
            ActionEvent::Executed { label, success, .. } => {
                assert_eq!(label, LABEL_REBALANCE_SUCCESS);
                assert!(success);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.pool_a.total_held(), 0);
        assert_eq!(h.pool_b.total_held(), 1000);

        // Triggered then Executed, in order, on the action feed.
        match actions.recv().await.unwrap() {
            ActionEvent::Triggered {
                action,
                from_index,
                to_index,
                amount,
                rate_gap_bps,
            } => {
                assert_eq!(action, ACTION_REBALANCE);
                assert_eq!((from_index, to_index), (0, 1));
                assert_eq!(amount, 1000);
                assert_eq!(rate_gap_bps, 500);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            actions.recv().await.unwrap(),
            ActionEvent::Executed { .. }
        ));
    }

    #[tokio::test]
    async fn test_second_evaluation_is_noop() {
        let h = harness(500, 1000);
        deposit(&h, 1000);

        h.agent.check_yield_and_rebalance(1000).await.unwrap();
        let ev = h.agent.check_yield_and_rebalance(1000).await.unwrap();
        match ev {
            ActionEvent::Executed { label, .. } => assert_eq!(label, LABEL_NO_REBALANCE),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.pool_b.total_held(), 1000);
    }

    #[tokio::test]
    async fn test_threshold_is_owner_only() {
        let h = harness(500, 1000);
        assert_eq!(
            h.agent
                .set_yield_threshold(&Principal::new("0xmallory"), 200),
            Err(VaultError::Unauthorized)
        );
        h.agent.set_yield_threshold(&owner(), 200).unwrap();
        assert_eq!(h.agent.yield_threshold(), 200);
    }

    #[tokio::test]
    async fn test_raised_threshold_suppresses_move() {
        let h = harness(500, 1000);
        deposit(&h, 1000);
        h.agent.set_yield_threshold(&owner(), 500).unwrap();

        let ev = h.agent.check_yield_and_rebalance(1000).await.unwrap();
        match ev {
            ActionEvent::Executed { label, .. } => assert_eq!(label, LABEL_NO_REBALANCE),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.pool_a.total_held(), 1000);
    }

    #[tokio::test]
    async fn test_prediction_without_oracle_is_hard_error() {
        let h = harness(500, 1000);
        deposit(&h, 1000);
        assert!(h
            .agent
            .submit_prediction(&[0u8; 32], b"in", &600u64.to_le_bytes())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_prediction_flow() {
        use crate::oracle::DemoOracle;

        let h = harness_opts(500, 1000, Some(Arc::new(DemoOracle::new("yield-lstm-v1"))));
        deposit(&h, 1000);

        // Short proof is a hard rejection, no state change.
        assert!(h
            .agent
            .submit_prediction(&[0u8; 16], b"in", &600u64.to_le_bytes())
            .await
            .is_err());
        assert_eq!(h.pool_b.total_held(), 0);

        // Score at the threshold does not fire.
        let ev = h
            .agent
            .submit_prediction(&[0u8; 32], b"in", &500u64.to_le_bytes())
            .await
            .unwrap();
        match ev {
            ActionEvent::Executed { label, .. } => assert_eq!(label, LABEL_NO_REBALANCE),
            other => panic!("unexpected {:?}", other),
        }

        // Verified score above the threshold fires the fixed demo move.
        let ev = h
            .agent
            .submit_prediction(&[0u8; 32], b"in", &600u64.to_le_bytes())
            .await
            .unwrap();
        match ev {
            ActionEvent::Executed { label, success, .. } => {
                assert_eq!(label, LABEL_REBALANCE_SUCCESS);
                assert!(success);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.pool_b.total_held(), 100);
        assert_eq!(h.pool_a.total_held(), 900);
    }
}
