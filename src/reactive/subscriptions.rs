//! Subscription Registry
//!
//! Process-wide table of `(chain_id, source_address, event_selector,
//! topics)` tuples the automation cares about. Populated once per pool at
//! setup; there is no unsubscribe. A relay task filters the origin
//! ledger's log stream against the table and forwards matches, with
//! at-least-once semantics and no ordering guarantee.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::LogEvent;

/// The exact log shape a subscriber is interested in. Empty `topics`
/// means any topics match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub chain_id: u64,
    pub address: String,
    pub selector: String,
    pub topics: Vec<String>,
}

impl Subscription {
    pub fn new(chain_id: u64, address: &str, selector: &str) -> Self {
        Self {
            chain_id,
            address: address.to_lowercase(),
            selector: selector.to_string(),
            topics: Vec::new(),
        }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn matches(&self, ev: &LogEvent) -> bool {
        if ev.chain_id != self.chain_id
            || ev.selector != self.selector
            || !ev.address.eq_ignore_ascii_case(&self.address)
        {
            return false;
        }
        self.topics
            .iter()
            .enumerate()
            .all(|(i, t)| ev.topics.get(i).map(|et| et == t).unwrap_or(false))
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    subs: RwLock<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a subscription. Idempotent: the delivery layer is
    /// unreliable and setup scripts retry, so re-subscribing the same
    /// tuple is a no-op rather than an error. Returns whether the tuple
    /// was newly added.
    pub fn subscribe(&self, sub: Subscription) -> bool {
        let mut subs = self.subs.write();
        if subs.contains(&sub) {
            debug!(address = %sub.address, "duplicate subscription ignored");
            return false;
        }
        debug!(chain_id = sub.chain_id, address = %sub.address, "subscribed");
        subs.push(sub);
        true
    }

    pub fn matches(&self, ev: &LogEvent) -> bool {
        self.subs.read().iter().any(|s| s.matches(ev))
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.subs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.read().is_empty()
    }
}

/// Forward matching origin-ledger logs to the agent's inbox.
///
/// A lagged broadcast receiver just skips ahead: missed rate updates are
/// recovered at the next evaluation because the agent always re-reads
/// live state. Stops when the log bus or the agent inbox closes.
pub fn spawn_subscription_relay(
    registry: Arc<SubscriptionRegistry>,
    mut logs: broadcast::Receiver<LogEvent>,
    inbox: mpsc::Sender<LogEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match logs.recv().await {
                Ok(ev) => {
                    if registry.matches(&ev) {
                        if inbox.send(ev).await.is_err() {
                            debug!("agent inbox closed, relay stopping");
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "log relay lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("log bus closed, relay stopping");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RATE_UPDATED_SELECTOR;

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let sub = Subscription::new(1, "0xPool", RATE_UPDATED_SELECTOR);

        assert!(registry.subscribe(sub.clone()));
        assert!(!registry.subscribe(sub.clone()));
        assert!(!registry.subscribe(sub));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_matching_filters_on_all_fields() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(Subscription::new(1, "0xpool", RATE_UPDATED_SELECTOR));

        assert!(registry.matches(&LogEvent::rate_updated(1, "0xPOOL", 500)));
        assert!(!registry.matches(&LogEvent::rate_updated(2, "0xpool", 500)));
        assert!(!registry.matches(&LogEvent::rate_updated(1, "0xother", 500)));

        let wrong_selector = LogEvent {
            selector: "0xdeadbeef".to_string(),
            ..LogEvent::rate_updated(1, "0xpool", 500)
        };
        assert!(!registry.matches(&wrong_selector));
    }

    #[test]
    fn test_topic_prefix_must_match() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(
            Subscription::new(1, "0xpool", RATE_UPDATED_SELECTOR)
                .with_topics(vec!["t1".to_string()]),
        );

        let mut ev = LogEvent::rate_updated(1, "0xpool", 500);
        assert!(!registry.matches(&ev));
        ev.topics = vec!["t1".to_string(), "extra".to_string()];
        assert!(registry.matches(&ev));
    }

    #[tokio::test]
    async fn test_relay_forwards_only_matches() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(Subscription::new(1, "0xpool-a", RATE_UPDATED_SELECTOR));

        let (log_tx, log_rx) = broadcast::channel(16);
        let (inbox_tx, mut inbox_rx) = mpsc::channel(16);
        let handle = spawn_subscription_relay(registry, log_rx, inbox_tx);

        log_tx
            .send(LogEvent::rate_updated(1, "0xpool-b", 900))
            .unwrap();
        log_tx
            .send(LogEvent::rate_updated(1, "0xpool-a", 900))
            .unwrap();
        drop(log_tx);

        let forwarded = inbox_rx.recv().await.expect("one event forwarded");
        assert_eq!(forwarded.address, "0xpool-a");
        assert!(inbox_rx.recv().await.is_none());
        handle.await.unwrap();
    }
}
