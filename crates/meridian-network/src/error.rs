//! Errors raised while building and running the network backends.

use meridian_core::RoutingError;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// A configured multiaddr could not be parsed or lacks `/p2p/<peer>`.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// Channel send/receive failure.
    #[error("channel error: {0}")]
    Channel(String),

    /// The backend has been shut down.
    #[error("backend shut down")]
    ShutDown,
}

impl From<tokio::task::JoinError> for NetworkError {
    fn from(err: tokio::task::JoinError) -> Self {
        NetworkError::TaskFailed(err.to_string())
    }
}

impl From<NetworkError> for RoutingError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::ShutDown => RoutingError::Closed,
            NetworkError::InvalidAddress { .. } => RoutingError::Transport(err.to_string()),
            other => RoutingError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::InvalidAddress {
            addr: "/ip4/1.2.3.4".into(),
            reason: "missing /p2p".into(),
        };
        assert_eq!(err.to_string(), "invalid address '/ip4/1.2.3.4': missing /p2p");
    }

    #[test]
    fn test_shut_down_maps_to_closed() {
        let err: RoutingError = NetworkError::ShutDown.into();
        assert!(matches!(err, RoutingError::Closed));
    }

    #[test]
    fn test_task_failure_maps_to_other() {
        let err: RoutingError = NetworkError::TaskFailed("panicked".into()).into();
        assert!(matches!(err, RoutingError::Other(_)));
    }
}
