//! Small router adapters: capability composition, namespace limits, null.

use async_trait::async_trait;
use libp2p::PeerId;
use meridian_core::{Capabilities, ContentKey, PeerAddrInfo, RecordKey, Routing, RoutingError};
use std::sync::Arc;

use crate::registry::same_instance;

/// Builds one router out of per-capability delegates.
///
/// A capability without a delegate reports `NotSupported`.
#[derive(Clone, Default)]
pub struct Compose {
    pub value_store: Option<Arc<dyn Routing>>,
    pub content_routing: Option<Arc<dyn Routing>>,
    pub peer_routing: Option<Arc<dyn Routing>>,
}

impl Compose {
    pub fn values(router: Arc<dyn Routing>) -> Self {
        Self {
            value_store: Some(router),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Routing for Compose {
    fn name(&self) -> &str {
        "compose"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            value_store: self.value_store.is_some(),
            content_routing: self.content_routing.is_some(),
            peer_routing: self.peer_routing.is_some(),
        }
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        match &self.value_store {
            Some(r) => r.put_value(key, value).await,
            None => Err(RoutingError::NotSupported),
        }
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        match &self.value_store {
            Some(r) => r.get_value(key).await,
            None => Err(RoutingError::NotSupported),
        }
    }

    async fn provide(&self, key: &ContentKey, announce: bool) -> Result<(), RoutingError> {
        match &self.content_routing {
            Some(r) => r.provide(key, announce).await,
            None => Err(RoutingError::NotSupported),
        }
    }

    async fn find_providers(
        &self,
        key: &ContentKey,
        limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        match &self.content_routing {
            Some(r) => r.find_providers(key, limit).await,
            None => Err(RoutingError::NotSupported),
        }
    }

    async fn find_peer(&self, peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        match &self.peer_routing {
            Some(r) => r.find_peer(peer).await,
            None => Err(RoutingError::NotSupported),
        }
    }

    async fn bootstrap(&self) -> Result<(), RoutingError> {
        for r in self.sub_routers() {
            r.bootstrap().await?;
        }
        Ok(())
    }

    /// Distinct delegates, in value/content/peer order.
    fn sub_routers(&self) -> Vec<Arc<dyn Routing>> {
        let mut out: Vec<Arc<dyn Routing>> = Vec::new();
        for r in [&self.value_store, &self.content_routing, &self.peer_routing]
            .into_iter()
            .flatten()
        {
            if !out.iter().any(|seen| same_instance(seen, r)) {
                out.push(r.clone());
            }
        }
        out
    }
}

/// Restricts a value store to a fixed set of record namespaces.
///
/// Reads outside the namespaces are `NotFound`; writes are `NotSupported`.
pub struct LimitedValueStore {
    inner: Arc<dyn Routing>,
    namespaces: Vec<String>,
    name: String,
}

impl LimitedValueStore {
    pub fn new(inner: Arc<dyn Routing>, namespaces: Vec<String>) -> Self {
        let name = format!("{}[{}]", inner.name(), namespaces.join(","));
        Self {
            inner,
            namespaces,
            name,
        }
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    fn allows(&self, key: &RecordKey) -> bool {
        key.namespace()
            .map(|ns| self.namespaces.iter().any(|n| n == ns))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Routing for LimitedValueStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::VALUE_STORE
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        if !self.allows(key) {
            return Err(RoutingError::NotSupported);
        }
        self.inner.put_value(key, value).await
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        if !self.allows(key) {
            return Err(RoutingError::NotFound);
        }
        self.inner.get_value(key).await
    }

    fn sub_routers(&self) -> Vec<Arc<dyn Routing>> {
        vec![self.inner.clone()]
    }
}

/// A router that knows nothing and accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRouter;

#[async_trait]
impl Routing for NullRouter {
    fn name(&self) -> &str {
        "null"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    async fn put_value(&self, _key: &RecordKey, _value: Vec<u8>) -> Result<(), RoutingError> {
        Ok(())
    }

    async fn get_value(&self, _key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        Err(RoutingError::NotFound)
    }

    async fn provide(&self, _key: &ContentKey, _announce: bool) -> Result<(), RoutingError> {
        Ok(())
    }

    async fn find_providers(
        &self,
        _key: &ContentKey,
        _limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        Ok(Vec::new())
    }

    async fn find_peer(&self, _peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        Err(RoutingError::NotFound)
    }
}
