//! Routing-layer error types shared by every Meridian crate.

/// Errors produced by routing backends and the composites built from them.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The key, peer or provider set is not known to the router.
    #[error("routing: not found")]
    NotFound,

    /// The router does not implement the requested operation.
    #[error("routing: operation or key not supported")]
    NotSupported,

    /// The node has no network connectivity for this operation.
    #[error("routing: operation not supported in offline mode")]
    Offline,

    /// The router has been closed and no longer accepts operations.
    #[error("routing: router closed")]
    Closed,

    /// A record failed validation.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A provider was asked to build a backend without the transport it needs.
    #[error("missing transport: {0}")]
    MissingTransport(String),

    /// Every member of a composite router failed.
    #[error("all routers failed: {}", join_errors(.0))]
    AllFailed(Vec<RoutingError>),

    /// Transport-level failure (pubsub, swarm command channel).
    #[error("transport error: {0}")]
    Transport(String),

    /// Datastore read/write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization / deserialization error.
    #[error("codec error: {0}")]
    Codec(String),

    /// Generic / catchall error.
    #[error("{0}")]
    Other(String),
}

impl RoutingError {
    /// True for [`RoutingError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, RoutingError::NotFound)
    }

    /// True for [`RoutingError::NotSupported`].
    pub fn is_not_supported(&self) -> bool {
        matches!(self, RoutingError::NotSupported)
    }
}

fn join_errors(errors: &[RoutingError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for RoutingError {
    fn from(err: serde_json::Error) -> Self {
        RoutingError::Codec(err.to_string())
    }
}

impl From<libp2p::kad::store::Error> for RoutingError {
    fn from(err: libp2p::kad::store::Error) -> Self {
        RoutingError::Storage(err.to_string())
    }
}
