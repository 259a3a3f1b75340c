use crate::protocol::DecodeError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for submux
#[derive(Error, Debug)]
pub enum SubMuxError {
    /// Connection open/send/receive failure. Recoverable: the lifecycle
    /// manager drains and reconnects, it is never surfaced per-subscription.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame or unexpected message. Treated like a transport
    /// failure: the connection is recycled.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A frame failed to decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// No connection_ack within the handshake timeout.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The server rejected the handshake repeatedly; retrying would be
    /// futile, the client shuts down instead of backing off forever.
    #[error("credentials rejected {rejections} consecutive times")]
    AuthRejected { rejections: u32 },

    /// A subscription with the same client key is already registered.
    #[error("subscription key already registered: {0}")]
    DuplicateKey(String),

    /// Internal channel send error
    #[error("channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client is shutting down; no new subscriptions are accepted.
    #[error("client is shutting down")]
    Shutdown,
}

/// Result type for submux operations
pub type Result<T> = std::result::Result<T, SubMuxError>;
