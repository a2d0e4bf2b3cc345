//! Reactive Automation - Origin-Ledger Observation, Decision, Dispatch
//!
//! This module handles:
//! 1. The subscription table mapping origin-ledger logs to the agent
//! 2. The event-driven rebalancer that re-evaluates policy on delivery
//! 3. The append-only journal of triggers and outcomes
//!
//! Delivery is assumed unreliable: at-least-once, unordered, laggy. The
//! design leans on re-reading live state and policy idempotence instead
//! of sequence numbers.

pub mod agent;
pub mod journal;
pub mod subscriptions;

pub use agent::{
    spawn_rebalancer, ReactiveRebalancer, RebalancerConfig, LABEL_NO_REBALANCE,
    LABEL_REBALANCE_FAILED, LABEL_REBALANCE_SUCCESS,
};
pub use journal::{ActionJournal, ActionRecord};
pub use subscriptions::{spawn_subscription_relay, Subscription, SubscriptionRegistry};
