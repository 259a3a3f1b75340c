//! Frame codec for the graphql-transport-ws subprotocol
//!
//! All frames are textual JSON objects discriminated by a `type` field:
//!
//! ```text
//! Client ──{type:"connection_init", payload}──> Server
//! Client <─{type:"connection_ack"}───────────── Server
//! Client ──{type:"subscribe", id, payload}────> Server
//! Client <─{type:"next", id, payload}────────── Server   (zero or more)
//! Client <─{type:"error", id, payload}───────── Server   (terminal)
//! Client <─{type:"complete", id}─────────────── Server   (terminal)
//! Client ──{type:"complete", id}──────────────> Server   (unsubscribe)
//! Client <─{type:"ping"} / {type:"pong"}──────> Server   (keep-alive)
//! ```
//!
//! Decoding fails closed: malformed JSON or an unknown `type` tag yields a
//! `DecodeError` and never a partially-populated frame. The lifecycle manager
//! treats any `DecodeError` as a protocol violation and recycles the
//! connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A frame that could not be decoded.
#[derive(Debug, Error)]
#[error("malformed protocol frame: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// The `payload` of a subscribe frame: the subscription document plus its
/// variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Opens the protocol handshake; `payload` carries the credentials.
    ConnectionInit { payload: Value },
    /// Registers a subscription under a client-assigned operation id.
    Subscribe { id: String, payload: SubscribePayload },
    /// Unsubscribes the given operation id.
    Complete { id: String },
    Ping,
    Pong,
    /// Announces an orderly client shutdown.
    Bye,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Accepts the handshake.
    ConnectionAck,
    /// One event for the subscription registered under `id`.
    Next { id: String, payload: Value },
    /// Terminates the subscription `id` with an error payload.
    Error { id: String, payload: Value },
    /// Terminates the subscription `id` normally.
    Complete { id: String },
    Ping,
    Pong,
    /// The server is closing the connection.
    Bye,
}

/// Encode a client frame to its wire representation.
pub fn encode(frame: &ClientFrame) -> Result<String, DecodeError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a wire unit into a server frame. Fails closed.
pub fn decode(raw: &str) -> Result<ServerFrame, DecodeError> {
    Ok(serde_json::from_str(raw)?)
}
