//! Common test utilities for SubMux integration tests
//!
//! Provides a scripted in-process transport (every connection attempt hands
//! the test a [`ServerEnd`] to play the server with) and a small real
//! WebSocket server speaking graphql-transport-ws.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use submux::{FrameSink, FrameStream, Headers, Result, SubMuxError, Transport};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The server side of one scripted connection.
///
/// Dropping (or `close()`-ing) it ends the connection from the client's
/// point of view, which is how tests simulate a connection loss.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<Result<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Send one frame to the client.
    pub fn send(&self, frame: Value) {
        self.to_client
            .send(Ok(frame.to_string()))
            .expect("client side gone");
    }

    /// Send raw text to the client, valid JSON or not.
    pub fn send_raw(&self, raw: &str) {
        self.to_client
            .send(Ok(raw.to_string()))
            .expect("client side gone");
    }

    /// Inject a transport-level read error.
    pub fn send_error(&self, message: &str) {
        self.to_client
            .send(Err(SubMuxError::Transport(message.to_string())))
            .expect("client side gone");
    }

    /// Receive the next frame the client sent, parsed as JSON.
    pub async fn recv(&mut self) -> Value {
        let raw = tokio::time::timeout(RECV_TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection");
        serde_json::from_str(&raw).expect("client sent invalid JSON")
    }

    /// Receive a frame and assert its "type" tag.
    pub async fn expect(&mut self, frame_type: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(
            frame["type"], frame_type,
            "expected a {frame_type} frame, got {frame}"
        );
        frame
    }

    /// Answer the client's connection_init with connection_ack.
    pub async fn accept_handshake(&mut self) {
        self.expect("connection_init").await;
        self.send(json!({"type": "connection_ack"}));
    }

    /// Drop the connection.
    pub fn close(self) {}
}

/// Transport whose every `connect()` yields an in-process connection and
/// delivers the server side to the test through a channel.
pub struct MockTransport {
    sessions: mpsc::UnboundedSender<ServerEnd>,
    fail_next: AtomicUsize,
}

impl MockTransport {
    /// Returns the transport and the stream of server ends, one per
    /// successful connection attempt.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (sessions, session_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sessions,
                fail_next: AtomicUsize::new(0),
            }),
            session_rx,
        )
    }

    /// Make the next `n` connection attempts fail at the transport level.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        _headers: &Headers,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SubMuxError::Transport("scripted connect failure".into()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.sessions
            .send(ServerEnd {
                to_client,
                from_client,
            })
            .map_err(|_| SubMuxError::Transport("test server gone".into()))?;

        Ok((
            Box::new(MockSink { tx: client_tx }),
            Box::new(MockStream { rx: client_rx }),
        ))
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| SubMuxError::Transport("connection closed".into()))
    }

    async fn close(&mut self) {}
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

/// Wait for the next server end or panic.
pub async fn next_session(sessions: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    tokio::time::timeout(RECV_TIMEOUT, sessions.recv())
        .await
        .expect("timed out waiting for a connection attempt")
        .expect("transport dropped")
}

/// A real WebSocket server speaking just enough graphql-transport-ws for
/// end-to-end tests: acks the handshake, answers every subscribe with one
/// `next` frame, answers protocol pings with pongs.
pub struct MockGraphQlServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl MockGraphQlServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                tokio::spawn(Self::handle_connection(stream));
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self { addr, shutdown }
    }

    async fn handle_connection(stream: tokio::net::TcpStream) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_hdr_async;
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
        use tokio_tungstenite::tungstenite::Message;

        // Echo the subprotocol the client requests; tungstenite's client
        // rejects the handshake when the server names none.
        let ws_stream = match accept_hdr_async(stream, |_req: &Request, mut resp: Response| {
            resp.headers_mut().insert(
                "sec-websocket-protocol",
                "graphql-transport-ws".parse().unwrap(),
            );
            Ok(resp)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        while let Some(Ok(msg)) = read.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let frame: Value = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(_) => continue,
            };
            let reply = match frame["type"].as_str() {
                Some("connection_init") => Some(json!({"type": "connection_ack"})),
                Some("subscribe") => Some(json!({
                    "type": "next",
                    "id": frame["id"],
                    "payload": {"data": {"ready": true}},
                })),
                Some("ping") => Some(json!({"type": "pong"})),
                _ => None,
            };
            if let Some(reply) = reply {
                if write.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockGraphQlServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
