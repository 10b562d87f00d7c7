//! In-process pubsub hub.
//!
//! Every handle forked from the same hub sees the same topics, so several
//! nodes in one process can gossip records without a network.

use async_trait::async_trait;
use dashmap::DashMap;
use libp2p::PeerId;
use meridian_core::{PubSub, PubSubMessage, RoutingError, Subscription};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Per-subscriber queue length.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct LocalPubSub {
    topics: Arc<DashMap<String, Vec<mpsc::Sender<PubSubMessage>>>>,
    source: PeerId,
    capacity: usize,
}

impl LocalPubSub {
    pub fn new(source: PeerId) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            source,
            capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// A handle on the same hub publishing as `source`.
    pub fn fork(&self, source: PeerId) -> Self {
        Self {
            topics: self.topics.clone(),
            source,
            capacity: self.capacity,
        }
    }

    pub fn source(&self) -> &PeerId {
        &self.source
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PubSub for LocalPubSub {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), RoutingError> {
        let Some(mut subs) = self.topics.get_mut(topic) else {
            tracing::trace!(%topic, "publish with no subscribers");
            return Ok(());
        };
        subs.retain(|tx| !tx.is_closed());
        for tx in subs.iter() {
            let msg = PubSubMessage {
                topic: topic.to_string(),
                source: Some(self.source),
                data: data.clone(),
            };
            match tx.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(%topic, "subscriber queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RoutingError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.topics.entry(topic.to_string()).or_default().push(tx);
        tracing::debug!(%topic, source = %self.source, "subscribed");
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), RoutingError> {
        self.topics.remove(topic);
        tracing::debug!(%topic, "unsubscribed");
        Ok(())
    }
}
