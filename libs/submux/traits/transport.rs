//! Transport adapter boundary
//!
//! The engine talks to the outside world through three object-safe traits:
//! [`Transport`] opens one physical connection and hands back a write half
//! ([`FrameSink`]) and a read half ([`FrameStream`]). The halves are separate
//! objects so the lifecycle task can `select!` over inbound frames while
//! still holding the sink for outbound writes.
//!
//! [`WsTransport`] is the production implementation over tokio-tungstenite.
//! Tests substitute a scripted in-memory transport.

use crate::traits::{Result, SubMuxError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{http, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// HTTP headers to send with the connection request.
pub type Headers = HashMap<String, String>;

/// Write half of a physical connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one textual wire unit.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Close the connection. Best effort; errors are swallowed because the
    /// peer may already be gone.
    async fn close(&mut self);
}

/// Read half of a physical connection.
#[async_trait]
pub trait FrameStream: Send {
    /// The next textual wire unit. `None` means the connection is closed;
    /// `Some(Err(_))` is a transport-level read failure.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// Opens physical connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        headers: &Headers,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

/// WebSocket transport over tokio-tungstenite.
///
/// Advertises the `graphql-transport-ws` subprotocol and applies any
/// configured headers to the upgrade request. Invalid header names/values
/// are skipped with a warning rather than failing the connection.
pub struct WsTransport;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct WsSink(futures::stream::SplitSink<WsStream, Message>);

struct WsRead(futures::stream::SplitStream<WsStream>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.0
            .send(Message::Text(frame))
            .await
            .map_err(|e| SubMuxError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

#[async_trait]
impl FrameStream for WsRead {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // WebSocket-level control frames; tungstenite answers pings
                // itself, the protocol's keep-alive rides on text frames.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Ok(Message::Binary(_)) => {
                    return Some(Err(SubMuxError::Protocol(
                        "unexpected binary frame on a textual protocol".into(),
                    )))
                }
                Err(e) => return Some(Err(SubMuxError::Transport(e.to_string()))),
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        headers: &Headers,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let mut request = url
            .into_client_request()
            .map_err(|e| SubMuxError::Configuration(format!("invalid url '{url}': {e}")))?;

        request.headers_mut().insert(
            http::header::SEC_WEBSOCKET_PROTOCOL,
            http::HeaderValue::from_static("graphql-transport-ws"),
        );

        for (key, value) in headers {
            match (
                key.parse::<http::header::HeaderName>(),
                value.parse::<http::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => warn!("skipping invalid header '{}'", key),
            }
        }

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| SubMuxError::Transport(e.to_string()))?;
        debug!("websocket established to {}", url);

        let (write, read) = ws.split();
        Ok((Box::new(WsSink(write)), Box::new(WsRead(read))))
    }
}
