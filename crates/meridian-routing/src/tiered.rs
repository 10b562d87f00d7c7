//! Tiered composite used for content routing.

use async_trait::async_trait;
use libp2p::PeerId;
use meridian_core::{Capabilities, ContentKey, PeerAddrInfo, RecordKey, Routing, RoutingError};
use std::future::Future;
use std::sync::Arc;

use crate::fanout::{reconcile_read_errors, reconcile_writes};
use crate::registry::{RouterEntry, SealedRegistry};

/// Tries members one after another in priority order.
///
/// Reads return the first success (for `find_providers`, the first non-empty
/// answer). Writes visit every member in order and succeed if any does.
#[derive(Debug, Clone, Default)]
pub struct TieredRouter {
    members: Vec<RouterEntry>,
}

impl TieredRouter {
    /// Build from entries already in priority order.
    pub fn new(members: Vec<RouterEntry>) -> Self {
        Self { members }
    }

    /// Build from the content-routing subset of a sealed registry.
    pub fn content_routers(registry: &SealedRegistry) -> Self {
        Self::new(registry.content_routers())
    }

    pub fn members(&self) -> &[RouterEntry] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    async fn first_success<T, F, Fut>(&self, op: F) -> Result<T, RoutingError>
    where
        F: Fn(Arc<dyn Routing>) -> Fut + Send,
        Fut: Future<Output = Result<T, RoutingError>> + Send,
        T: Send,
    {
        let mut errors = Vec::new();
        for entry in &self.members {
            match op(entry.router.clone()).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::trace!(router = %entry.name(), error = %e, "tier missed");
                    errors.push(e);
                }
            }
        }
        Err(reconcile_read_errors(errors))
    }

    async fn each_in_order<F, Fut>(&self, op: F, name: &'static str) -> Result<(), RoutingError>
    where
        F: Fn(Arc<dyn Routing>) -> Fut + Send,
        Fut: Future<Output = Result<(), RoutingError>> + Send,
    {
        let mut results = Vec::with_capacity(self.members.len());
        for entry in &self.members {
            results.push(op(entry.router.clone()).await);
        }
        reconcile_writes(&self.members, results, name)
    }
}

#[async_trait]
impl Routing for TieredRouter {
    fn name(&self) -> &str {
        "tiered"
    }

    fn capabilities(&self) -> Capabilities {
        self.members
            .iter()
            .fold(Capabilities::NONE, |caps, e| caps.union(e.router.capabilities()))
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        self.each_in_order(
            |r| {
                let value = value.clone();
                async move { r.put_value(key, value).await }
            },
            "put_value",
        )
        .await
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        self.first_success(|r| async move { r.get_value(key).await })
            .await
    }

    async fn provide(&self, key: &ContentKey, announce: bool) -> Result<(), RoutingError> {
        self.each_in_order(|r| async move { r.provide(key, announce).await }, "provide")
            .await
    }

    async fn find_providers(
        &self,
        key: &ContentKey,
        limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        let mut answered_empty = false;
        let mut errors = Vec::new();
        for entry in &self.members {
            match entry.router.find_providers(key, limit).await {
                Ok(providers) if !providers.is_empty() => {
                    tracing::trace!(
                        router = %entry.name(),
                        count = providers.len(),
                        "providers found"
                    );
                    return Ok(providers);
                }
                Ok(_) => answered_empty = true,
                Err(e) => errors.push(e),
            }
        }
        if answered_empty {
            return Ok(Vec::new());
        }
        match reconcile_read_errors(errors) {
            RoutingError::NotFound => Ok(Vec::new()),
            err => Err(err),
        }
    }

    async fn find_peer(&self, peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        self.first_success(|r| async move { r.find_peer(peer).await })
            .await
    }

    async fn bootstrap(&self) -> Result<(), RoutingError> {
        self.each_in_order(|r| async move { r.bootstrap().await }, "bootstrap")
            .await
    }

    fn sub_routers(&self) -> Vec<Arc<dyn Routing>> {
        self.members.iter().map(|e| e.router.clone()).collect()
    }
}
