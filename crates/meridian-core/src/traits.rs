use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::RoutingError;
use crate::types::{Capabilities, ContentKey, PeerAddrInfo, RecordKey};

/// Routing backend interface.
///
/// Every backend (DHT, pubsub value store, offline datastore) and every
/// composite built from backends implements this trait. Operations a backend
/// does not serve keep the default body and report
/// [`RoutingError::NotSupported`]; composites treat that as "no opinion".
#[async_trait]
pub trait Routing: Send + Sync {
    /// Short identifier used in logs (e.g. "dht", "pubsub", "offline").
    fn name(&self) -> &str;

    /// The operations this router actually serves.
    fn capabilities(&self) -> Capabilities;

    /// Store a record under `key`.
    async fn put_value(&self, _key: &RecordKey, _value: Vec<u8>) -> Result<(), RoutingError> {
        Err(RoutingError::NotSupported)
    }

    /// Fetch the best known record for `key`.
    async fn get_value(&self, _key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        Err(RoutingError::NotSupported)
    }

    /// Announce this node as a provider of `key`. With `announce == false`
    /// the provider record is only kept locally.
    async fn provide(&self, _key: &ContentKey, _announce: bool) -> Result<(), RoutingError> {
        Err(RoutingError::NotSupported)
    }

    /// Find up to `limit` providers of `key` (`0` means no limit).
    async fn find_providers(
        &self,
        _key: &ContentKey,
        _limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        Err(RoutingError::NotSupported)
    }

    /// Resolve the addresses of `peer`.
    async fn find_peer(&self, _peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        Err(RoutingError::NotSupported)
    }

    /// Bring the router into a usable state (connect to bootstrap peers etc).
    async fn bootstrap(&self) -> Result<(), RoutingError> {
        Ok(())
    }

    /// Routers composed inside this one, one level deep.
    fn sub_routers(&self) -> Vec<Arc<dyn Routing>> {
        Vec::new()
    }

    /// This router as a DHT client, if it is one.
    fn as_dht(self: Arc<Self>) -> Option<Arc<dyn DhtClient>> {
        None
    }
}

/// A backend owning resources that must be released on shutdown.
#[async_trait]
pub trait Closable: Send + Sync {
    async fn close(&self) -> Result<(), RoutingError>;
}

/// The stateful DHT client: routes, owns background work, and knows peers.
#[async_trait]
pub trait DhtClient: Routing + Closable {
    /// Peers currently in the routing table.
    async fn routing_table(&self) -> Result<Vec<PeerAddrInfo>, RoutingError>;

    /// Record an address learned for `peer` (identify, mDNS, manual).
    async fn add_address(&self, peer: PeerId, addr: Multiaddr) -> Result<(), RoutingError>;
}

/// Record validator.
///
/// Validation logic lives with the record types; the routing layer only
/// consumes it.
pub trait Validator: Send + Sync {
    /// Check that `value` is a well-formed, authentic record for `key`.
    fn validate(&self, key: &RecordKey, value: &[u8]) -> Result<(), RoutingError>;

    /// Index of the best record among `values` (all previously validated).
    fn select(&self, key: &RecordKey, values: &[Vec<u8>]) -> Result<usize, RoutingError>;
}

/// A message delivered on a pubsub topic.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub topic: String,
    pub source: Option<PeerId>,
    pub data: Vec<u8>,
}

/// Stream of messages for one topic subscription.
pub type Subscription = mpsc::Receiver<PubSubMessage>;

/// Publish/subscribe transport.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), RoutingError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RoutingError>;

    /// Drop every local subscription to `topic`.
    async fn unsubscribe(&self, topic: &str) -> Result<(), RoutingError>;
}

/// Key/value datastore backing the repo.
pub trait Datastore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RoutingError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), RoutingError>;

    fn delete(&self, key: &[u8]) -> Result<(), RoutingError>;

    fn has(&self, key: &[u8]) -> Result<bool, RoutingError> {
        Ok(self.get(key)?.is_some())
    }
}
