//! Parallel composite used for value and peer routing.

use async_trait::async_trait;
use libp2p::PeerId;
use meridian_core::{Capabilities, ContentKey, PeerAddrInfo, RecordKey, Routing, RoutingError};
use std::sync::Arc;

use crate::fanout::{
    all_settled, first_by_priority, merge_providers, reconcile_read_errors, reconcile_writes,
};
use crate::registry::{RouterEntry, SealedRegistry};

/// Dispatches every operation to all members concurrently.
///
/// - `get_value` / `find_peer`: the most-preferred successful answer wins;
///   a member's answer is taken once all members ahead of it have finished
///   without one.
/// - `find_providers`: union of all members, de-duplicated, in priority order.
/// - `put_value` / `provide` / `bootstrap`: sent to all members, succeeds if
///   any member succeeds.
///
/// With no members every lookup is `NotFound` and every write is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ParallelRouter {
    members: Vec<RouterEntry>,
}

impl ParallelRouter {
    /// Build from entries already in priority order.
    pub fn new(members: Vec<RouterEntry>) -> Self {
        Self { members }
    }

    /// Build from every entry of a sealed registry.
    pub fn from_registry(registry: &SealedRegistry) -> Self {
        Self::new(registry.sorted().to_vec())
    }

    pub fn members(&self) -> &[RouterEntry] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Routing for ParallelRouter {
    fn name(&self) -> &str {
        "parallel"
    }

    fn capabilities(&self) -> Capabilities {
        self.members
            .iter()
            .fold(Capabilities::NONE, |caps, e| caps.union(e.router.capabilities()))
    }

    async fn put_value(&self, key: &RecordKey, value: Vec<u8>) -> Result<(), RoutingError> {
        let results = all_settled(&self.members, |r| {
            let value = value.clone();
            async move { r.put_value(key, value).await }
        })
        .await;
        reconcile_writes(&self.members, results, "put_value")
    }

    async fn get_value(&self, key: &RecordKey) -> Result<Vec<u8>, RoutingError> {
        first_by_priority(&self.members, |r| async move { r.get_value(key).await }).await
    }

    async fn provide(&self, key: &ContentKey, announce: bool) -> Result<(), RoutingError> {
        let results =
            all_settled(&self.members, |r| async move { r.provide(key, announce).await }).await;
        reconcile_writes(&self.members, results, "provide")
    }

    async fn find_providers(
        &self,
        key: &ContentKey,
        limit: usize,
    ) -> Result<Vec<PeerAddrInfo>, RoutingError> {
        let results = all_settled(&self.members, |r| async move {
            r.find_providers(key, limit).await
        })
        .await;

        let mut lists = Vec::new();
        let mut errors = Vec::new();
        for (entry, result) in self.members.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(e) => {
                    tracing::debug!(router = %entry.name(), error = %e, "find_providers failed");
                    errors.push(e);
                }
            }
        }

        if lists.is_empty() && !errors.is_empty() {
            let err = reconcile_read_errors(errors);
            if !err.is_not_found() {
                return Err(err);
            }
        }
        Ok(merge_providers(lists, limit))
    }

    async fn find_peer(&self, peer: &PeerId) -> Result<PeerAddrInfo, RoutingError> {
        first_by_priority(&self.members, |r| async move { r.find_peer(peer).await }).await
    }

    async fn bootstrap(&self) -> Result<(), RoutingError> {
        let results = all_settled(&self.members, |r| async move { r.bootstrap().await }).await;
        reconcile_writes(&self.members, results, "bootstrap")
    }

    fn sub_routers(&self) -> Vec<Arc<dyn Routing>> {
        self.members.iter().map(|e| e.router.clone()).collect()
    }
}
