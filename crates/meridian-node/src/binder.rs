//! Ties the DHT client's shutdown to the node lifecycle.

use meridian_core::{Closable, DhtClient, Routing, RoutingError};
use meridian_routing::same_instance;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::lifecycle::{Hook, Lifecycle};

/// A closable backend that is closed at most once, however often it is
/// reached.
pub struct BoundResource<T: ?Sized + Closable> {
    name: String,
    resource: Arc<T>,
    closed: AtomicBool,
}

impl<T: ?Sized + Closable> BoundResource<T> {
    pub fn new(name: impl Into<String>, resource: Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            resource,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn close(&self) -> Result<(), RoutingError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(resource = %self.name, "already closed");
            return Ok(());
        }
        tracing::info!(resource = %self.name, "closing");
        self.resource.close().await
    }

    /// A lifecycle hook closing this resource on stop.
    pub fn stop_hook(self: &Arc<Self>) -> Hook
    where
        T: 'static,
    {
        let bound = self.clone();
        Hook::new(format!("close {}", self.name)).on_stop(move || async move { bound.close().await })
    }
}

/// The DHT client reachable from `initial`: the router itself, or one of its
/// direct sub-routers (first match wins).
pub fn find_dht(initial: &Arc<dyn Routing>) -> Option<Arc<dyn DhtClient>> {
    if let Some(dht) = initial.clone().as_dht() {
        return Some(dht);
    }
    initial.sub_routers().into_iter().find_map(|sub| sub.as_dht())
}

/// Registers one close hook per distinct DHT client instance.
#[derive(Default)]
pub struct LifecycleBinder {
    bound: Vec<Arc<BoundResource<dyn DhtClient>>>,
}

impl LifecycleBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the DHT client behind `initial` and, unless that instance is
    /// already bound, register a stop hook closing it.
    pub fn bind(
        &mut self,
        lifecycle: &mut Lifecycle,
        initial: &Arc<dyn Routing>,
    ) -> Option<Arc<dyn DhtClient>> {
        let Some(dht) = find_dht(initial) else {
            tracing::debug!(router = %initial.name(), "no dht client to bind");
            return None;
        };

        if self
            .bound
            .iter()
            .any(|b| same_instance(b.resource(), &dht))
        {
            tracing::debug!(router = %dht.name(), "dht client already bound");
            return Some(dht);
        }

        let bound = BoundResource::new(dht.name(), dht.clone());
        lifecycle.append(bound.stop_hook());
        self.bound.push(bound);
        Some(dht)
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }
}
