//! Integration test: orderly shutdown of assembled routing.
//!
//! Every resource-owning backend is closed exactly once and the relay
//! feeder stops writing before its stop hook returns.

use std::sync::Arc;
use std::time::Duration;

use meridian_core::{Closable, MemoryDatastore, PubSub, RecordKey, Routing, RoutingError};
use meridian_integration_tests::{peer_with_addr, temp_dir, AcceptAll, MockDht};
use meridian_network::{DhtConfig, DhtRouter, LocalPubSub};
use meridian_node::binder::BoundResource;
use meridian_node::routing::{assemble, RoutingDeps};
use meridian_node::{Lifecycle, MeridianConfig, MeridianNode};
use meridian_routing::Compose;

fn deps(initial: Arc<dyn Routing>, pubsub: Option<Arc<dyn PubSub>>) -> RoutingDeps {
    RoutingDeps {
        host: libp2p::PeerId::random(),
        initial,
        validator: Arc::new(AcceptAll),
        datastore: Arc::new(MemoryDatastore::new()),
        pubsub,
    }
}

#[tokio::test]
async fn test_nested_dht_closed_once() {
    let dht = Arc::new(MockDht::default());
    let initial: Arc<dyn Routing> = Arc::new(Compose {
        value_store: Some(dht.clone()),
        content_routing: Some(dht.clone()),
        peer_routing: Some(dht.clone()),
    });
    let mut config = MeridianConfig::default();
    config.relay.feeder_enabled = false;

    let mut lifecycle = Lifecycle::new();
    let assembled = assemble(&mut lifecycle, deps(initial, None), &config).unwrap();
    assert!(assembled.dht.is_some());
    assert_eq!(lifecycle.stop_hook_count(), 1);

    lifecycle.start().await.unwrap();
    lifecycle.stop().await.unwrap();
    assert_eq!(dht.close_count(), 1);
}

#[tokio::test]
async fn test_double_close_is_single_close() {
    let dht = Arc::new(MockDht::default());
    let bound = BoundResource::new("dht", dht.clone());

    let mut lifecycle = Lifecycle::new();
    lifecycle.append(bound.stop_hook());
    lifecycle.start().await.unwrap();

    bound.close().await.unwrap();
    lifecycle.stop().await.unwrap();
    assert_eq!(dht.close_count(), 1);
}

#[tokio::test]
async fn test_feeder_stops_writing_before_stop_returns() {
    let table = (1..=8).map(peer_with_addr).collect();
    let dht = Arc::new(MockDht::with_table(table));

    let mut config = MeridianConfig::default();
    config.relay.channel_capacity = 1;
    config.relay.interval_secs = 1;

    let mut lifecycle = Lifecycle::new();
    let mut assembled = assemble(&mut lifecycle, deps(dht.clone(), None), &config).unwrap();
    let mut candidates = assembled.relay_candidates.take().unwrap();

    lifecycle.start().await.unwrap();
    // Nobody reads: the feeder fills the channel and parks in send.
    tokio::time::sleep(Duration::from_millis(50)).await;
    lifecycle.stop().await.unwrap();

    let mut buffered = 0;
    while candidates.try_recv().is_ok() {
        buffered += 1;
    }
    assert!(buffered <= 1);
    assert!(candidates.recv().await.is_none());
    assert_eq!(dht.close_count(), 1);
}

#[tokio::test]
async fn test_real_dht_rejects_operations_after_stop() {
    let host = libp2p::PeerId::random();
    let dht = DhtRouter::spawn(host, Arc::new(AcceptAll), DhtConfig::default()).unwrap();
    let pubsub: Arc<dyn PubSub> = Arc::new(LocalPubSub::new(host));

    let mut config = MeridianConfig::default();
    config.pubsub.enabled = true;

    let mut lifecycle = Lifecycle::new();
    let assembled = assemble(&mut lifecycle, deps(dht.clone(), Some(pubsub)), &config).unwrap();
    lifecycle.start().await.unwrap();

    let key = RecordKey::new("/ipns/k");
    assembled.value.put_value(&key, b"v".to_vec()).await.unwrap();
    lifecycle.stop().await.unwrap();

    assert!(dht.is_closed());
    assert!(matches!(dht.get_value(&key).await, Err(RoutingError::Closed)));
    // Closing again outside the lifecycle is harmless.
    dht.close().await.unwrap();
}

#[tokio::test]
async fn test_node_restart_keeps_offline_records() {
    let dir = temp_dir("meridian-shutdown");
    let mut config = MeridianConfig::default();
    config.routing.offline = true;
    config.storage.data_dir = dir.join("data");
    config.identity.keypair_path = Some(dir.join("key"));

    let mut node = MeridianNode::new(config.clone()).unwrap();
    node.start().await.unwrap();
    let published = node.publish_name("/content/persisted").await.unwrap();
    node.shutdown().await.unwrap();
    drop(node);

    let mut node = MeridianNode::new(config).unwrap();
    node.start().await.unwrap();
    let resolved = node.resolve_name(&node.peer_id()).await.unwrap();
    assert_eq!(resolved, published);

    let next = node.publish_name("/content/next").await.unwrap();
    assert_eq!(next.sequence, published.sequence + 1);
    node.shutdown().await.unwrap();

    std::fs::remove_dir_all(&dir).ok();
}
