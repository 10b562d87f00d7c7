//! Meridian node: routing assembly, lifecycle management and storage.
//!
//! [`routing::assemble`] turns the node's backends into a sealed router
//! registry plus the value and content composites; [`MeridianNode`] owns the
//! resulting lifecycle.

pub mod binder;
pub mod config;
pub mod lifecycle;
pub mod node;
pub mod records;
pub mod relay_feeder;
pub mod routing;
pub mod storage;

pub use config::MeridianConfig;
pub use lifecycle::{Hook, Lifecycle, LifecycleError};
pub use node::MeridianNode;
pub use routing::{assemble, AssembledRouting, RoutingDeps};
