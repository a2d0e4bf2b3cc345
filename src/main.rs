//! Yieldloop - Reactive Cross-Ledger Yield Rebalancer
//!
//! Wires the three subsystems together:
//! - origin ledger: simulated pools + vault allocation engine
//! - reactive ledger: subscription relay + rebalancer agent
//! - destination ledger: remote execution hub
//!
//! The two "ledgers" are in-process tasks joined by channels; the same
//! protocol rules apply as on real chains: no shared atomicity, only
//! structured outcomes cross the boundary.

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yieldloop_backend::{
    api::{self, ApiState},
    hub::{spawn_remote_hub, CallbackClient, RemoteHub},
    models::{Config, LogEvent, Principal, RATE_UPDATED_SELECTOR},
    oracle::DemoOracle,
    reactive::{
        spawn_rebalancer, spawn_subscription_relay, ActionJournal, ReactiveRebalancer,
        RebalancerConfig, Subscription, SubscriptionRegistry,
    },
    vault::{SimulatedPool, VaultEvent, YieldAdapter, YieldVault},
};

#[derive(Parser, Debug)]
#[command(name = "yieldloop", about = "Reactive cross-ledger yield rebalancer")]
struct Args {
    /// Override the listen port from the environment
    #[arg(long)]
    port: Option<u16>,
    /// Force the pool-rate simulator on
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let owner = Principal::new("0xdeployer-local");
    let relayer = Principal::new("0xreactive-network");
    let hub_identity = Principal::new("0xremote-hub");

    // Origin-ledger log bus and pools.
    let (log_tx, _) = broadcast::channel::<LogEvent>(256);
    let pools = vec![
        SimulatedPool::with_log_bus("0xpool-a", 500, config.origin_chain_id, log_tx.clone()),
        SimulatedPool::with_log_bus("0xpool-b", 1000, config.origin_chain_id, log_tx.clone()),
    ];

    // Vault with the pools registered, hub authorized for moves.
    let (vault_events_tx, mut vault_events_rx) = broadcast::channel::<VaultEvent>(64);
    let mut vault = YieldVault::new(&config.asset, owner.clone()).with_event_sink(vault_events_tx);
    for pool in &pools {
        vault.add_adapter(&owner, pool.clone())?;
    }
    vault.set_authorization(&owner, hub_identity.clone(), true)?;
    let vault = vault.into_shared();

    tokio::spawn(async move {
        while let Ok(ev) = vault_events_rx.recv().await {
            let detail = serde_json::to_string(&ev).unwrap_or_default();
            info!(event = %detail, "vault");
        }
    });

    // Destination-ledger hub behind its delivery channel.
    let hub = RemoteHub::new(owner.clone(), hub_identity);
    hub.set_vault(&owner, vault.clone())?;
    hub.set_reactive_network(&owner, relayer.clone())?;
    let (cb_tx, cb_rx) = mpsc::channel(64);
    spawn_remote_hub(hub, cb_rx);

    // One subscription per pool, registered once at setup.
    let registry = SubscriptionRegistry::new();
    for pool in &pools {
        registry.subscribe(Subscription::new(
            config.origin_chain_id,
            pool.address(),
            RATE_UPDATED_SELECTOR,
        ));
    }
    let (inbox_tx, inbox_rx) = mpsc::channel(64);
    spawn_subscription_relay(registry.clone(), log_tx.subscribe(), inbox_tx);

    let journal = ActionJournal::new(&config.database_path)
        .with_context(|| format!("open journal at {}", config.database_path))?;

    let agent = Arc::new(
        ReactiveRebalancer::new(
            owner.clone(),
            vault.clone(),
            CallbackClient::new(relayer, cb_tx),
            RebalancerConfig {
                yield_threshold_bps: config.yield_threshold_bps,
                prediction_score_threshold: config.prediction_score_threshold,
                ..RebalancerConfig::default()
            },
        )
        .with_journal(journal.clone())
        .with_oracle(Arc::new(DemoOracle::new("yield-lstm-v1"))),
    );
    spawn_rebalancer(agent.clone(), inbox_rx);

    info!(
        pools = pools.len(),
        threshold_bps = config.yield_threshold_bps,
        "yieldloop wired"
    );

    if config.simulate_rates || args.simulate {
        let sim_pools = pools.clone();
        let every = Duration::from_secs(config.simulate_interval_secs.max(1));
        tokio::spawn(async move {
            let mut tick = interval(every);
            loop {
                tick.tick().await;
                let (i, rate) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_range(0..sim_pools.len()),
                        rng.gen_range(300..1600u64),
                    )
                };
                sim_pools[i].set_supply_rate(rate);
            }
        });
        info!(interval_secs = every.as_secs(), "rate simulator enabled");
    }

    let state = ApiState {
        vault,
        agent,
        registry,
        journal: Some(journal),
        started_at: chrono::Utc::now(),
    };
    let app = api::router(state);

    let port = args.port.unwrap_or(config.port);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind port {}", port))?;
    info!(port, "monitor api listening");
    axum::serve(listener, app).await.context("api server")?;

    Ok(())
}
