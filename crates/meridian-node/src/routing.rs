//! Routing providers and assembly.
//!
//! Each provider turns its dependencies into zero or one [`RouterEntry`] and
//! may register lifecycle hooks. [`assemble`] runs the providers, seals the
//! registry and builds the value and content composites.

use libp2p::PeerId;
use meridian_core::{Datastore, DhtClient, PeerAddrInfo, PubSub, Routing, RoutingError, Validator};
use meridian_network::{OfflineRouter, PubsubValueStore};
use meridian_routing::{
    priority, Compose, LimitedValueStore, ParallelRouter, RegistryBuilder, RouterEntry,
    SealedRegistry, TieredRouter,
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::binder::{BoundResource, LifecycleBinder};
use crate::config::{MeridianConfig, PubsubConfig};
use crate::lifecycle::{Hook, Lifecycle};
use crate::relay_feeder::{FeederSettings, RelayFeeder};

/// The primary routing backend and what was learned about it.
pub struct BaseRouting {
    pub router: RouterEntry,
    pub content_router: Arc<dyn Routing>,
    pub dht: Option<Arc<dyn DhtClient>>,
}

/// Register `initial` at the initial priority and bind the DHT client behind
/// it, if any, to the lifecycle.
pub fn base_routing(
    lifecycle: &mut Lifecycle,
    binder: &mut LifecycleBinder,
    initial: Arc<dyn Routing>,
) -> BaseRouting {
    let dht = binder.bind(lifecycle, &initial);
    BaseRouting {
        router: RouterEntry::new(initial.clone(), priority::INITIAL),
        content_router: initial,
        dht,
    }
}

/// The pubsub value store, limited to the configured namespaces.
///
/// Fails with [`RoutingError::MissingTransport`] when no pubsub transport was
/// provided.
pub fn pubsub_router(
    lifecycle: &mut Lifecycle,
    host: PeerId,
    validator: Arc<dyn Validator>,
    pubsub: Option<Arc<dyn PubSub>>,
    config: &PubsubConfig,
) -> Result<(RouterEntry, Arc<PubsubValueStore>), RoutingError> {
    let pubsub = pubsub.ok_or_else(|| {
        RoutingError::MissingTransport("pubsub routing enabled but no pubsub transport".into())
    })?;

    let store = PubsubValueStore::new(host, pubsub, validator, config.rebroadcast_interval());
    let limited = LimitedValueStore::new(store.clone(), config.namespaces.clone());
    let router: Arc<dyn Routing> = Arc::new(Compose::values(Arc::new(limited)));

    let bound = BoundResource::new("pubsub", store.clone());
    lifecycle.append(bound.stop_hook());

    Ok((RouterEntry::new(router, priority::PUBSUB), store))
}

/// Records served from the local datastore.
pub fn offline_routing(datastore: Arc<dyn Datastore>, validator: Arc<dyn Validator>) -> RouterEntry {
    RouterEntry::new(
        Arc::new(OfflineRouter::new(datastore, validator)),
        priority::OFFLINE,
    )
}

/// The value/peer router over every registered backend.
pub fn value_routing(registry: &SealedRegistry) -> Arc<ParallelRouter> {
    Arc::new(ParallelRouter::from_registry(registry))
}

/// The content router over the backends that do provider discovery.
pub fn content_routing(registry: &SealedRegistry) -> Arc<TieredRouter> {
    Arc::new(TieredRouter::content_routers(registry))
}

/// Everything routing needs from the rest of the node.
pub struct RoutingDeps {
    pub host: PeerId,
    pub initial: Arc<dyn Routing>,
    pub validator: Arc<dyn Validator>,
    pub datastore: Arc<dyn Datastore>,
    pub pubsub: Option<Arc<dyn PubSub>>,
}

/// The assembled routing layer.
pub struct AssembledRouting {
    pub registry: SealedRegistry,
    pub value: Arc<ParallelRouter>,
    pub content: Arc<TieredRouter>,
    /// The initial backend before composition.
    pub base_content: Arc<dyn Routing>,
    pub dht: Option<Arc<dyn DhtClient>>,
    pub pubsub_store: Option<Arc<PubsubValueStore>>,
    /// Relay candidates, when the feeder runs.
    pub relay_candidates: Option<mpsc::Receiver<PeerAddrInfo>>,
}

/// Run every provider and build the composites.
///
/// Hooks are staged and only added to `lifecycle` once every provider has
/// succeeded, so a failed assembly registers nothing.
pub fn assemble(
    lifecycle: &mut Lifecycle,
    deps: RoutingDeps,
    config: &MeridianConfig,
) -> Result<AssembledRouting, RoutingError> {
    let mut staged = Lifecycle::new();
    let mut binder = LifecycleBinder::new();
    let mut builder = RegistryBuilder::new();

    let peering = parse_peering(&config.relay.peering_peers)?;

    let pubsub = if config.pubsub.enabled {
        Some(pubsub_router(
            &mut staged,
            deps.host,
            deps.validator.clone(),
            deps.pubsub,
            &config.pubsub,
        )?)
    } else {
        None
    };

    let base = base_routing(&mut staged, &mut binder, deps.initial);
    let offline = config
        .routing
        .offline
        .then(|| offline_routing(deps.datastore, deps.validator));

    let (pubsub_entry, pubsub_store) = match pubsub {
        Some((entry, store)) => (Some(entry), Some(store)),
        None => (None, None),
    };
    builder.register_all([Some(base.router), pubsub_entry, offline]);

    let registry = builder.seal();
    let value = value_routing(&registry);
    let content = content_routing(&registry);

    let relay_candidates = if config.relay.feeder_enabled && !config.routing.offline {
        let (tx, rx) = mpsc::channel(config.relay.channel_capacity.max(1));
        let feeder = RelayFeeder::new(
            FeederSettings::from(&config.relay),
            base.dht.clone(),
            peering,
            tx,
        );
        let starter = feeder.clone();
        staged.append(
            Hook::new("relay feeder")
                .on_start(move || async move { starter.start().await })
                .on_stop(move || async move {
                    feeder.shutdown().await;
                    Ok(())
                }),
        );
        Some(rx)
    } else {
        None
    };

    lifecycle.extend(staged);
    tracing::info!(
        routers = registry.len(),
        content_routers = content.members().len(),
        dht = base.dht.is_some(),
        "routing assembled"
    );

    Ok(AssembledRouting {
        registry,
        value,
        content,
        base_content: base.content_router,
        dht: base.dht,
        pubsub_store,
        relay_candidates,
    })
}

fn parse_peering(addrs: &[String]) -> Result<Vec<PeerAddrInfo>, RoutingError> {
    addrs.iter().map(|a| PeerAddrInfo::parse(a)).collect()
}
