//! Configurable in-memory routers for composite tests.

use async_trait::async_trait;
use meridian_core::{Capabilities, ContentKey, PeerAddrInfo, RecordKey, Routing, RoutingError};
use libp2p::PeerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How a [`StaticRouter`] fails every operation, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    NotSupported,
    Offline,
}

pub struct StaticRouter {
    name: String,
    caps: Capabilities,
    values: Mutex<HashMap<RecordKey, Vec<u8>>>,
    providers: Vec<PeerAddrInfo>,
    peers: Vec<PeerAddrInfo>,
    failure: Failure,
    delay: Duration,
    pub puts: AtomicUsize,
    pub provides: AtomicUsize,
    pub gets: AtomicUsize,
    pub bootstraps: AtomicUsize,
}

impl StaticRouter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            caps: Capabilities::ALL,
            values: Mutex::new(HashMap::new()),
            providers: Vec::new(),
            peers: Vec::new(),
            failure: Failure::None,
            delay: Duration::ZERO,
            puts: AtomicUsize::new(0),
            provides: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            bootstraps: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_value(self, key: &str, value: &[u8]) -> Self {
        self.values
            .lock()
            .unwrap()
            .insert(RecordKey::new(key), value.to_vec());
        self
    }

    pub fn with_providers(mut self, providers: Vec<PeerAddrInfo>) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_peer(mut self, info: PeerAddrInfo) -> Self {
        self.peers.push(info);
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(&RecordKey::new(key)).cloned()
    }

    async fn enter(&self) -> Result<(), RoutingError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.failure {
            Failure::None => Ok(()),
            Failure::NotSupported => Err(RoutingError::NotSupported),
            Failure::Offline => Err(RoutingError::Offline),
        }
    }
}

#[async_trait]
impl Routing for StaticRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.values.lock().unwrap().insert(key.clone(), value);
        Ok(())
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.values
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(RoutingError::NotFound)
    }

    async fn provide(&self, _key: &ContentKey, _announce: bool) -> Result<(), RoutingError> {
        self.provides.fetch_add(1, Ordering::SeqCst);
        self.enter().await
    }

    async fn find_providers(
        &self,
        _key: &ContentKey,
        limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        self.enter().await?;
        let mut out = self.providers.clone();
        if limit > 0 {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn find_peer(&self, peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        self.enter().await?;
        self.peers
            .iter()
            .find(|p| &p.peer_id == peer)
            .cloned()
            .ok_or(RoutingError::NotFound)
    }

    async fn bootstrap(&self) -> Result<(), RoutingError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        self.enter().await
    }
}
