//! Datastore-backed router for nodes without network access.

use async_trait::async_trait;
use libp2p::PeerId;
use meridian_core::{
    Capabilities, ContentKey, Datastore, PeerAddrInfo, RecordKey, Routing, RoutingError,
    Validator,
};
use std::sync::Arc;

/// Datastore key prefix for routing records.
const RECORD_PREFIX: &str = "/routing/record";

/// Serves value records from the local datastore. Content and peer routing
/// need the network and report [`RoutingError::Offline`].
pub struct OfflineRouter {
    datastore: Arc<dyn Datastore>,
    validator: Arc<dyn Validator>,
}

impl OfflineRouter {
    pub fn new(datastore: Arc<dyn Datastore>, validator: Arc<dyn Validator>) -> Self {
        Self {
            datastore,
            validator,
        }
    }

    fn datastore_key(key: &RecordKey) -> Vec<u8> {
        format!("{}{}", RECORD_PREFIX, key).into_bytes()
    }
}

#[async_trait]
impl Routing for OfflineRouter {
    fn name(&self) -> &str {
        "offline"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::VALUE_STORE
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        self.validator.validate(key, &value)?;
        self.datastore.put(&Self::datastore_key(key), &value)?;
        tracing::debug!(%key, bytes = value.len(), "stored record offline");
        Ok(())
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        let value = self
            .datastore
            .get(&Self::datastore_key(key))?
            .ok_or(RoutingError::NotFound)?;
        self.validator.validate(key, &value)?;
        Ok(value)
    }

    async fn provide(&self, _key: &ContentKey, _announce: bool) -> Result<(), RoutingError> {
        Err(RoutingError::Offline)
    }

    async fn find_providers(
        &self,
        _key: &ContentKey,
        _limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        Ok(Vec::new())
    }

    async fn find_peer(&self, _peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        Err(RoutingError::Offline)
    }
}
