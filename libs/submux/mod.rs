//! # SubMux
//!
//! A resilient GraphQL-over-WebSocket subscription client that multiplexes
//! any number of logical subscriptions over one physical connection.
//!
//! ## Features
//!
//! - **One connection, many subscriptions**: client-assigned ids demultiplex
//!   server frames to their owning subscription
//! - **Transparent reconnection**: exponential backoff plus automatic replay
//!   of every registered subscription after each successful handshake
//! - **Generation tracking**: frames from a previous connection incarnation
//!   are structurally impossible to deliver to a live subscription
//! - **Independent delivery queues**: one bounded queue per subscription, so
//!   a slow consumer never stalls its neighbors
//! - **Type-state builder**: compile-time guarantees for required configuration

pub mod core;
pub mod protocol;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, config,
    builder::{states, SubMuxBuilder},
    client::SubscriptionClient,
    config::{ClientConfig, DeliveryPolicy, Keepalive},
    handle::{SubscriptionEvent, SubscriptionHandle},
    link_state::{AtomicLinkState, AtomicMetrics, LinkState, MetricsSnapshot},
    SubscriptionRequest,
};

// Re-export the wire frame types
pub use protocol::{ClientFrame, ServerFrame, SubscribePayload};

// `core::builder` names both the builder module and the convenience
// function; the single re-export above covers both.

/// Type alias for Result with SubMuxError
pub type Result<T> = std::result::Result<T, traits::SubMuxError>;
