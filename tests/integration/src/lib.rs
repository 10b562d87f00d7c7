//! Mock backends shared by the integration tests.

use async_trait::async_trait;
use dashmap::DashMap;
use libp2p::{Multiaddr, PeerId};
use meridian_core::{
    Capabilities, Closable, DhtClient, PeerAddrInfo, RecordKey, Routing, RoutingError, Validator,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A value store holding fixed records.
pub struct FixedStore {
    name: String,
    values: DashMap<RecordKey, Vec<u8>>,
}

impl FixedStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: DashMap::new(),
        }
    }

    pub fn with(self, key: &str, value: &[u8]) -> Self {
        self.values.insert(RecordKey::new(key), value.to_vec());
        self
    }

    pub fn holds(&self, key: &str) -> bool {
        self.values.contains_key(&RecordKey::new(key))
    }
}

#[async_trait]
impl Routing for FixedStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::VALUE_STORE
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        self.values.insert(key.clone(), value);
        Ok(())
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        self.values
            .get(key)
            .map(|v| v.clone())
            .ok_or(RoutingError::NotFound)
    }
}

/// A DHT client that counts closes and serves a fixed routing table.
#[derive(Default)]
pub struct MockDht {
    pub closes: AtomicUsize,
    table: Vec<PeerAddrInfo>,
}

impl MockDht {
    pub fn with_table(table: Vec<PeerAddrInfo>) -> Self {
        Self {
            closes: AtomicUsize::new(0),
            table,
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Routing for MockDht {
    fn name(&self) -> &str {
        "mock-dht"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn find_providers(
        &self,
        _key: &meridian_core::ContentKey,
        _limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        Ok(Vec::new())
    }

    fn as_dht(self: Arc<Self>) -> Option<Arc<dyn DhtClient>> {
        Some(self)
    }
}

#[async_trait]
impl Closable for MockDht {
    async fn close(&self) -> Result<(), RoutingError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DhtClient for MockDht {
    async fn routing_table(&self) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        Ok(self.table.clone())
    }

    async fn add_address(&self, _peer: PeerId, _addr: Multiaddr) -> Result<(), RoutingError> {
        Ok(())
    }
}

/// Accepts every record; the first candidate wins.
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _key: &RecordKey, _value: &[u8]) -> Result<(), RoutingError> {
        Ok(())
    }

    fn select(&self, _key: &RecordKey, _values: &[Vec<u8>]) -> Result<usize, RoutingError> {
        Ok(0)
    }
}

/// A peer with one routable address.
pub fn peer_with_addr(last_octet: u8) -> PeerAddrInfo {
    let addr = format!("/ip4/10.0.0.{last_octet}/tcp/4001");
    match addr.parse() {
        Ok(addr) => PeerAddrInfo::new(PeerId::random(), vec![addr]),
        Err(e) => panic!("bad test multiaddr {addr}: {e}"),
    }
}

/// A fresh directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", rand::random::<u64>()));
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("could not create {}: {e}", dir.display());
    }
    dir
}
