//! Router registry: prioritized entries collected during assembly.

use meridian_core::Routing;
use std::fmt;
use std::sync::Arc;

/// Well-known router priorities. Lower is more authoritative.
pub mod priority {
    /// Pubsub value store: fresher than the DHT for the namespaces it claims.
    pub const PUBSUB: i32 = 100;
    /// The initial routing backend, usually the DHT.
    pub const INITIAL: i32 = 1000;
    /// Local-datastore fallback for nodes without a network.
    pub const OFFLINE: i32 = 10_000;
}

/// A routing backend paired with its priority.
#[derive(Clone)]
pub struct RouterEntry {
    pub router: Arc<dyn Routing>,
    pub priority: i32,
}

impl RouterEntry {
    pub fn new(router: Arc<dyn Routing>, priority: i32) -> Self {
        Self { router, priority }
    }

    pub fn name(&self) -> &str {
        self.router.name()
    }
}

impl fmt::Debug for RouterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterEntry")
            .field("router", &self.router.name())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Accumulates entries from provider calls during assembly.
///
/// Append-only; [`RegistryBuilder::seal`] sorts once and freezes the result.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<RouterEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one entry.
    pub fn register(&mut self, entry: RouterEntry) {
        tracing::debug!(
            router = %entry.name(),
            priority = entry.priority,
            position = self.entries.len(),
            "registering router"
        );
        self.entries.push(entry);
    }

    /// Register the outputs of several providers. `None` contributes nothing.
    pub fn register_all<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = Option<RouterEntry>>,
    {
        for entry in entries.into_iter().flatten() {
            self.register(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort ascending by priority and freeze.
    ///
    /// The sort is stable: entries sharing a priority keep registration order.
    pub fn seal(self) -> SealedRegistry {
        let mut entries = self.entries;
        entries.sort_by_key(|e| e.priority);
        tracing::info!(
            routers = ?entries.iter().map(|e| (e.name().to_string(), e.priority)).collect::<Vec<_>>(),
            "router registry sealed"
        );
        SealedRegistry { entries }
    }
}

/// The sorted, immutable router registry.
#[derive(Debug, Clone, Default)]
pub struct SealedRegistry {
    entries: Vec<RouterEntry>,
}

impl SealedRegistry {
    /// Entries ascending by priority, ties in registration order.
    pub fn sorted(&self) -> &[RouterEntry] {
        &self.entries
    }

    pub fn entries(&self) -> Vec<RouterEntry> {
        self.entries.clone()
    }

    /// The bare routers, in sorted order.
    pub fn routers(&self) -> Vec<Arc<dyn Routing>> {
        self.entries.iter().map(|e| e.router.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose backend serves provider discovery.
    pub fn content_routers(&self) -> Vec<RouterEntry> {
        self.entries
            .iter()
            .filter(|e| e.router.capabilities().content_routing)
            .cloned()
            .collect()
    }
}

/// Whether two router handles point at the same instance.
pub fn same_instance<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
