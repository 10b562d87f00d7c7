//! Meridian core types and routing capability traits.
//!
//! Everything the routing layer consumes from the outside world is described
//! here as a narrow trait:
//!
//! - [`Routing`]: value, content and peer routing operations
//! - [`Closable`] / [`DhtClient`]: stateful backends that must be shut down
//! - [`Validator`]: record validation, consumed not implemented
//! - [`PubSub`]: publish/subscribe transport
//! - [`Datastore`]: the repo's key/value store

pub mod datastore;
pub mod error;
pub mod traits;
pub mod types;
pub mod validator;

pub use datastore::MemoryDatastore;
pub use error::RoutingError;
pub use traits::{
    Closable, Datastore, DhtClient, PubSub, PubSubMessage, Routing, Subscription, Validator,
};
pub use types::{Capabilities, ContentKey, PeerAddrInfo, RecordKey};
pub use validator::NamespacedValidator;

// Re-export commonly used libp2p types for downstream convenience.
pub use libp2p::{Multiaddr, PeerId};
