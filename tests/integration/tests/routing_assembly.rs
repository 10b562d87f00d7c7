//! Integration test: building the routing layer across crates.
//!
//! Registers backends from meridian-network and mocks, seals the registry
//! and checks how the meridian-routing composites reconcile them.

use std::sync::Arc;

use meridian_core::{ContentKey, MemoryDatastore, PubSub, RecordKey, Routing, RoutingError};
use meridian_integration_tests::{AcceptAll, FixedStore, MockDht};
use meridian_network::{LocalPubSub, OfflineRouter, PubsubValueStore, DEFAULT_REBROADCAST_INTERVAL};
use meridian_node::routing::{assemble, RoutingDeps};
use meridian_node::{Lifecycle, MeridianConfig};
use meridian_routing::{
    priority, Compose, LimitedValueStore, NullRouter, ParallelRouter, RegistryBuilder, RouterEntry,
    TieredRouter,
};

fn deps(initial: Arc<dyn Routing>, pubsub: Option<Arc<dyn PubSub>>) -> RoutingDeps {
    RoutingDeps {
        host: libp2p::PeerId::random(),
        initial,
        validator: Arc::new(AcceptAll),
        datastore: Arc::new(MemoryDatastore::new()),
        pubsub,
    }
}

// =========================================================================
// Registry ordering
// =========================================================================

#[test]
fn test_sorted_by_priority_across_backends() {
    let mut builder = RegistryBuilder::new();
    builder.register(RouterEntry::new(
        Arc::new(OfflineRouter::new(Arc::new(MemoryDatastore::new()), Arc::new(AcceptAll))),
        priority::OFFLINE,
    ));
    builder.register(RouterEntry::new(Arc::new(MockDht::default()), priority::INITIAL));
    builder.register(RouterEntry::new(Arc::new(FixedStore::new("pubsub")), priority::PUBSUB));

    let registry = builder.seal();
    let priorities: Vec<i32> = registry.sorted().iter().map(|e| e.priority).collect();
    assert_eq!(priorities, vec![100, 1000, 10_000]);
    assert!(priorities.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_equal_priorities_keep_registration_order() {
    let mut builder = RegistryBuilder::new();
    for name in ["first", "second", "third"] {
        builder.register(RouterEntry::new(Arc::new(FixedStore::new(name)), 500));
    }
    builder.register(RouterEntry::new(Arc::new(FixedStore::new("early")), 1));

    let registry = builder.seal();
    let names: Vec<&str> = registry.sorted().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["early", "first", "second", "third"]);
}

// =========================================================================
// Composite behaviour
// =========================================================================

#[tokio::test]
async fn test_empty_registry_composites() {
    let registry = RegistryBuilder::new().seal();
    let value = ParallelRouter::from_registry(&registry);
    let content = TieredRouter::content_routers(&registry);

    let key = RecordKey::new("/ipns/k");
    assert!(matches!(value.get_value(&key).await, Err(RoutingError::NotFound)));
    value.put_value(&key, b"v".to_vec()).await.unwrap();
    value.provide(&ContentKey::new(b"c".to_vec()), true).await.unwrap();
    content.provide(&ContentKey::new(b"c".to_vec()), true).await.unwrap();
}

#[tokio::test]
async fn test_more_authoritative_value_wins() {
    let mut builder = RegistryBuilder::new();
    // Registered in the "wrong" order on purpose.
    builder.register(RouterEntry::new(
        Arc::new(FixedStore::new("b").with("/ipns/k", b"from-b")),
        1000,
    ));
    builder.register(RouterEntry::new(
        Arc::new(FixedStore::new("a").with("/ipns/k", b"from-a")),
        100,
    ));

    let value = ParallelRouter::from_registry(&builder.seal());
    assert_eq!(value.get_value(&RecordKey::new("/ipns/k")).await.unwrap(), b"from-a");
}

#[tokio::test]
async fn test_limited_pubsub_store_only_claims_its_namespaces() {
    let host = libp2p::PeerId::random();
    let store = PubsubValueStore::new(
        host,
        Arc::new(LocalPubSub::new(host)),
        Arc::new(AcceptAll),
        DEFAULT_REBROADCAST_INTERVAL,
    );
    let pubsub: Arc<dyn Routing> = Arc::new(Compose::values(Arc::new(LimitedValueStore::new(
        store.clone(),
        vec!["ipns".into()],
    ))));
    let fallback = Arc::new(FixedStore::new("fallback"));

    let mut builder = RegistryBuilder::new();
    builder.register(RouterEntry::new(pubsub, priority::PUBSUB));
    builder.register(RouterEntry::new(fallback.clone(), priority::INITIAL));
    let value = ParallelRouter::from_registry(&builder.seal());

    value.put_value(&RecordKey::new("/ipns/a"), b"name".to_vec()).await.unwrap();
    value.put_value(&RecordKey::new("/pk/a"), b"key".to_vec()).await.unwrap();

    assert_eq!(store.cached(&RecordKey::new("/ipns/a")).unwrap(), b"name");
    assert!(store.cached(&RecordKey::new("/pk/a")).is_none());
    assert!(fallback.holds("/ipns/a"));
    assert!(fallback.holds("/pk/a"));

    meridian_core::Closable::close(store.as_ref()).await.unwrap();
}

// =========================================================================
// Full assembly
// =========================================================================

#[tokio::test]
async fn test_assembly_wires_actual_entries_into_composites() {
    let mut config = MeridianConfig::default();
    config.pubsub.enabled = true;
    config.relay.feeder_enabled = false;

    let host = libp2p::PeerId::random();
    let dht = Arc::new(MockDht::default());
    let pubsub: Arc<dyn PubSub> = Arc::new(LocalPubSub::new(host));

    let mut lifecycle = Lifecycle::new();
    let assembled = assemble(&mut lifecycle, deps(dht.clone(), Some(pubsub)), &config).unwrap();

    let value_members: Vec<&str> = assembled.value.members().iter().map(|e| e.name()).collect();
    assert_eq!(value_members, vec!["compose", "mock-dht"]);
    let content_members: Vec<&str> = assembled.content.members().iter().map(|e| e.name()).collect();
    assert_eq!(content_members, vec!["mock-dht"]);
    assert!(assembled.dht.is_some());

    lifecycle.start().await.unwrap();
    lifecycle.stop().await.unwrap();
    assert_eq!(dht.close_count(), 1);
}

#[tokio::test]
async fn test_offline_assembly_reads_back_from_datastore() {
    let mut config = MeridianConfig::default();
    config.routing.offline = true;

    let mut lifecycle = Lifecycle::new();
    let assembled = assemble(&mut lifecycle, deps(Arc::new(NullRouter), None), &config).unwrap();

    let key = RecordKey::new("/ipns/offline");
    assembled.value.put_value(&key, b"stored".to_vec()).await.unwrap();
    assert_eq!(assembled.value.get_value(&key).await.unwrap(), b"stored");
    assert!(matches!(
        assembled
            .value
            .provide(&ContentKey::new(b"c".to_vec()), true)
            .await,
        Ok(())
    ));
}

#[test]
fn test_failed_provider_leaves_nothing_registered() {
    let mut config = MeridianConfig::default();
    config.pubsub.enabled = true;

    let dht = Arc::new(MockDht::default());
    let mut lifecycle = Lifecycle::new();
    let err = match assemble(&mut lifecycle, deps(dht.clone(), None), &config) {
        Err(e) => e,
        Ok(_) => panic!("pubsub without a transport must fail"),
    };

    assert!(matches!(err, RoutingError::MissingTransport(_)));
    assert!(err.to_string().contains("pubsub"));
    assert!(lifecycle.is_empty());
    assert_eq!(dht.close_count(), 0);
}
