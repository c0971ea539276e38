use thiserror::Error;

use crate::protocol::ConnectionId;

/// Errors raised by the session registry.
///
/// Neither variant is fatal: the dispatcher turns both into dropped events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Display name was empty or whitespace-only.
    #[error("display name must not be blank")]
    InvalidName,

    /// Operation referenced a connection that never registered.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

/// Errors from the line-JSON wire codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode packet: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Rejected server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}
