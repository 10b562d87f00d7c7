//! Value store backed by pubsub gossip.
//!
//! Each record key has its own topic. Records put locally are published on
//! it, records heard on it are validated and cached when better than what we
//! hold, and everything cached is republished periodically so late
//! subscribers converge.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use libp2p::PeerId;
use meridian_core::{
    Capabilities, Closable, PubSub, PubSubMessage, RecordKey, Routing, RoutingError,
    Subscription, Validator,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Topic prefix for record gossip.
pub const RECORD_TOPIC_PREFIX: &str = "/record/";

/// How often cached records are republished.
pub const DEFAULT_REBROADCAST_INTERVAL: Duration = Duration::from_secs(60);

/// The pubsub topic carrying records for `key`.
pub fn record_topic(key: &RecordKey) -> String {
    format!("{}{}", RECORD_TOPIC_PREFIX, URL_SAFE_NO_PAD.encode(key.as_bytes()))
}

/// Wire form of a gossiped record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordEnvelope {
    pub key: String,
    /// Base64 (standard alphabet) record bytes.
    pub value: String,
}

impl RecordEnvelope {
    pub fn new(key: &RecordKey, value: &[u8]) -> Self {
        Self {
            key: key.as_str().to_string(),
            value: STANDARD.encode(value),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RoutingError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<(RecordKey, Vec<u8>), RoutingError> {
        let envelope: RecordEnvelope = serde_json::from_slice(data)?;
        let value = STANDARD
            .decode(envelope.value.as_bytes())
            .map_err(|e| RoutingError::Codec(format!("record value: {e}")))?;
        Ok((RecordKey::new(envelope.key), value))
    }
}

/// State shared with the background tasks.
struct Shared {
    pubsub: Arc<dyn PubSub>,
    validator: Arc<dyn Validator>,
    cache: DashMap<RecordKey, Vec<u8>>,
}

impl Shared {
    /// Validate `value` and cache it if it beats the cached record.
    /// Returns whether the cache changed.
    fn offer(&self, key: &RecordKey, value: Vec<u8>) -> Result<bool, RoutingError> {
        self.validator.validate(key, &value)?;
        match self.cache.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                if slot.get() == &value {
                    return Ok(false);
                }
                let mut candidates = vec![slot.get().clone(), value];
                if self.validator.select(key, &candidates)? == 0 {
                    return Ok(false);
                }
                slot.insert(candidates.swap_remove(1));
                Ok(true)
            }
        }
    }

    fn accept(&self, msg: PubSubMessage) {
        let (key, value) = match RecordEnvelope::decode(&msg.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(topic = %msg.topic, error = %e, "dropping undecodable record");
                return;
            }
        };
        if record_topic(&key) != msg.topic {
            tracing::debug!(topic = %msg.topic, %key, "dropping record sent on foreign topic");
            return;
        }
        match self.offer(&key, value) {
            Ok(true) => tracing::debug!(%key, source = ?msg.source, "cached gossiped record"),
            Ok(false) => {}
            Err(e) => tracing::debug!(%key, error = %e, "dropping invalid record"),
        }
    }

    async fn publish(&self, key: &RecordKey, value: &[u8]) -> Result<(), RoutingError> {
        let data = RecordEnvelope::new(key, value).encode()?;
        self.pubsub.publish(&record_topic(key), data).await
    }
}

/// Value store that gossips records over [`PubSub`].
pub struct PubsubValueStore {
    host: PeerId,
    shared: Arc<Shared>,
    subscriptions: DashMap<String, JoinHandle<()>>,
    rebroadcast: Mutex<Option<JoinHandle<()>>>,
    cancel: watch::Sender<bool>,
    closed: AtomicBool,
}

impl PubsubValueStore {
    /// Create the store and start its rebroadcast task.
    pub fn new(
        host: PeerId,
        pubsub: Arc<dyn PubSub>,
        validator: Arc<dyn Validator>,
        rebroadcast_interval: Duration,
    ) -> Arc<Self> {
        let shared = Arc::new(Shared {
            pubsub,
            validator,
            cache: DashMap::new(),
        });
        let (cancel, _) = watch::channel(false);
        let rebroadcast = tokio::spawn(rebroadcast_loop(
            shared.clone(),
            rebroadcast_interval,
            cancel.subscribe(),
        ));

        tracing::info!(%host, interval_secs = rebroadcast_interval.as_secs(), "pubsub value store started");

        Arc::new(Self {
            host,
            shared,
            subscriptions: DashMap::new(),
            rebroadcast: Mutex::new(Some(rebroadcast)),
            cancel,
            closed: AtomicBool::new(false),
        })
    }

    pub fn host(&self) -> &PeerId {
        &self.host
    }

    /// Topics this store is listening on.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn cached(&self, key: &RecordKey) -> Option<Vec<u8>> {
        self.shared.cache.get(key).map(|v| v.clone())
    }

    async fn ensure_subscribed(&self, key: &RecordKey) -> Result<(), RoutingError> {
        let topic = record_topic(key);
        if self.subscriptions.contains_key(&topic) {
            return Ok(());
        }
        let sub = self.shared.pubsub.subscribe(&topic).await?;
        // close() may have run while we waited on the transport.
        if self.closed.load(Ordering::SeqCst) {
            drop(sub);
            if let Err(e) = self.shared.pubsub.unsubscribe(&topic).await {
                tracing::debug!(%topic, error = %e, "unsubscribe failed");
            }
            return Err(RoutingError::Closed);
        }
        if let Entry::Vacant(slot) = self.subscriptions.entry(topic.clone()) {
            tracing::debug!(%key, %topic, "subscribed to record topic");
            slot.insert(tokio::spawn(incoming_loop(
                self.shared.clone(),
                sub,
                self.cancel.subscribe(),
            )));
        }
        Ok(())
    }
}

async fn incoming_loop(shared: Arc<Shared>, mut sub: Subscription, mut cancel: watch::Receiver<bool>) {
    if *cancel.borrow_and_update() {
        return;
    }
    loop {
        tokio::select! {
            msg = sub.recv() => match msg {
                Some(msg) => shared.accept(msg),
                None => break,
            },
            _ = cancel.changed() => break,
        }
    }
}

async fn rebroadcast_loop(
    shared: Arc<Shared>,
    every: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let records: Vec<(RecordKey, Vec<u8>)> = shared
                    .cache
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect();
                for (key, value) in &records {
                    if let Err(e) = shared.publish(key, value).await {
                        tracing::warn!(%key, error = %e, "record rebroadcast failed");
                    }
                }
                tracing::trace!(count = records.len(), "rebroadcast cached records");
            }
            _ = cancel.changed() => break,
        }
    }
}

#[async_trait]
impl Routing for PubsubValueStore {
    fn name(&self) -> &str {
        "pubsub"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::VALUE_STORE
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RoutingError::Closed);
        }
        if !self.shared.offer(key, value.clone())? && self.cached(key).as_ref() != Some(&value) {
            tracing::debug!(%key, "cached record is better, not publishing");
            return Ok(());
        }
        self.ensure_subscribed(key).await?;
        self.shared.publish(key, &value).await
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RoutingError::Closed);
        }
        if let Some(value) = self.cached(key) {
            return Ok(value);
        }
        self.ensure_subscribed(key).await?;
        Err(RoutingError::NotFound)
    }
}

#[async_trait]
impl Closable for PubsubValueStore {
    async fn close(&self) -> Result<(), RoutingError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.cancel.send(true);

        let topics = self.topics();
        let mut tasks = Vec::with_capacity(topics.len() + 1);
        for topic in &topics {
            if let Some((_, task)) = self.subscriptions.remove(topic) {
                tasks.push(task);
            }
            if let Err(e) = self.shared.pubsub.unsubscribe(topic).await {
                tracing::debug!(%topic, error = %e, "unsubscribe failed");
            }
        }
        if let Some(task) = self.rebroadcast.lock().await.take() {
            tasks.push(task);
        }

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "pubsub task ended abnormally");
            }
        }
        tracing::info!(host = %self.host, topics = topics.len(), "pubsub value store closed");
        Ok(())
    }
}
