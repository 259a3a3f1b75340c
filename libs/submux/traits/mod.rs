//! # SubMux Traits
//!
//! External collaborator boundaries and policy traits:
//!
//! - **Transport / FrameSink / FrameStream**: the physical connection
//! - **TokenProvider**: handshake credentials
//! - **ReconnectPolicy**: backoff between connection attempts
//!
//! Each trait ships a production or no-op implementation so the builder can
//! default everything except the URL.

pub mod error;
pub mod reconnect;
pub mod token;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, SubMuxError};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectPolicy};
pub use token::{NoToken, StaticToken, TokenProvider};
pub use transport::{FrameSink, FrameStream, Headers, Transport, WsTransport};
