//! Router registry and composite routers.
//!
//! Backends are registered with a priority, sealed into a stable order, and
//! then combined: a [`ParallelRouter`] for value routing and a
//! [`TieredRouter`] for content routing.

pub mod compose;
mod fanout;
pub mod parallel;
pub mod registry;
pub mod tiered;

#[cfg(test)]
mod test_util;

pub use compose::{Compose, LimitedValueStore, NullRouter};
pub use parallel::ParallelRouter;
pub use registry::{priority, same_instance, RegistryBuilder, RouterEntry, SealedRegistry};
pub use tiered::TieredRouter;
