//! Meridian routing backends.
//!
//! - [`DhtRouter`]: the DHT client, a handle to a task owning the Kademlia
//!   record store and peer table
//! - [`PubsubValueStore`]: records gossiped over a [`meridian_core::PubSub`]
//! - [`OfflineRouter`]: records served from the local datastore
//! - [`LocalPubSub`]: in-process pubsub hub

pub mod dht;
pub mod error;
pub mod local_pubsub;
pub mod offline;
pub mod pubsub;

pub use dht::{DhtCommand, DhtConfig, DhtRouter};
pub use error::NetworkError;
pub use local_pubsub::LocalPubSub;
pub use offline::OfflineRouter;
pub use pubsub::{record_topic, PubsubValueStore, RecordEnvelope, DEFAULT_REBROADCAST_INTERVAL};

// Re-export commonly used libp2p types for downstream convenience.
pub use libp2p::{identity::Keypair, Multiaddr, PeerId};
