//! Monitor API
//!
//! Read-only HTTP surface for operators. Everything here is observation:
//! vault state, registered subscriptions, and recent automation records.
//! Mutations only ever happen through the ledger entry points.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::reactive::{ActionJournal, ActionRecord, ReactiveRebalancer, SubscriptionRegistry};
use crate::vault::SharedVault;

#[derive(Clone)]
pub struct ApiState {
    pub vault: SharedVault,
    pub agent: Arc<ReactiveRebalancer>,
    pub registry: Arc<SubscriptionRegistry>,
    pub journal: Option<ActionJournal>,
    pub started_at: DateTime<Utc>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/vault/state", get(vault_state))
        .route("/api/actions", get(recent_actions))
        .route("/api/subscriptions", get(subscriptions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: i64,
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

#[derive(Debug, Serialize)]
struct PoolDto {
    index: usize,
    rate_bps: u64,
    /// Amounts as decimal strings to stay JSON-safe.
    balance: String,
}

#[derive(Debug, Serialize)]
struct VaultStateResponse {
    asset: String,
    paused: bool,
    total_assets: String,
    idle_cash: String,
    yield_threshold_bps: u64,
    pools: Vec<PoolDto>,
}

async fn vault_state(State(state): State<ApiState>) -> Json<VaultStateResponse> {
    let (asset, paused, total_assets, idle_cash, snapshots) = {
        let vault = state.vault.read();
        (
            vault.asset().to_string(),
            vault.is_paused(),
            vault.total_assets(),
            vault.idle_cash(),
            vault.pool_snapshots(),
        )
    };

    Json(VaultStateResponse {
        asset,
        paused,
        total_assets: total_assets.to_string(),
        idle_cash: idle_cash.to_string(),
        yield_threshold_bps: state.agent.yield_threshold(),
        pools: snapshots
            .into_iter()
            .map(|p| PoolDto {
                index: p.index,
                rate_bps: p.rate_bps,
                balance: p.balance.to_string(),
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct ActionsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ActionsResponse {
    actions: Vec<ActionRecord>,
    count: usize,
}

async fn recent_actions(
    State(state): State<ApiState>,
    Query(q): Query<ActionsQuery>,
) -> Result<Json<ActionsResponse>, StatusCode> {
    let Some(journal) = &state.journal else {
        return Ok(Json(ActionsResponse {
            actions: Vec::new(),
            count: 0,
        }));
    };
    let actions = journal
        .list_recent(q.limit.unwrap_or(50))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let count = actions.len();
    Ok(Json(ActionsResponse { actions, count }))
}

#[derive(Debug, Serialize)]
struct SubscriptionsResponse {
    subscriptions: Vec<crate::reactive::Subscription>,
    count: usize,
}

async fn subscriptions(State(state): State<ApiState>) -> Json<SubscriptionsResponse> {
    let subscriptions = state.registry.list();
    let count = subscriptions.len();
    Json(SubscriptionsResponse {
        subscriptions,
        count,
    })
}
