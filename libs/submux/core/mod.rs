//! # SubMux core
//!
//! The engine behind [`SubscriptionClient`]: connection lifecycle, the
//! subscription registry with generation tracking, frame dispatch, and the
//! per-subscription bounded delivery queues.
//!
//! ## Example
//!
//! ```rust,ignore
//! use submux::SubscriptionEvent;
//!
//! #[tokio::main]
//! async fn main() -> submux::Result<()> {
//!     let client = submux::builder()
//!         .url("wss://api.example.com/graphql")
//!         .keepalive(Duration::from_secs(15), Duration::from_secs(45))
//!         .build()
//!         .await?;
//!
//!     let mut incidents = client.subscribe_with_key(
//!         "incidents",
//!         "subscription { criticalIncidents { id severity } }",
//!         None,
//!     )?;
//!
//!     while let Some(event) = incidents.next().await {
//!         match event {
//!             SubscriptionEvent::Next(data) => println!("{data}"),
//!             SubscriptionEvent::Failed(err) => eprintln!("failed: {err}"),
//!             SubscriptionEvent::Completed => break,
//!         }
//!     }
//!
//!     client.shutdown().await
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod handle;
pub mod link_state;

pub(crate) mod dispatcher;
pub(crate) mod liveness;
pub(crate) mod queue;
pub(crate) mod registry;

// Re-export main types
pub use builder::{states, SubMuxBuilder};
pub use client::SubscriptionClient;
pub use config::{ClientConfig, DeliveryPolicy, Keepalive};
pub use handle::{SubscriptionEvent, SubscriptionHandle};
pub use link_state::{AtomicLinkState, AtomicMetrics, LinkState, MetricsSnapshot};
pub use registry::SubscriptionRequest;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new subscription client builder
///
/// This is a convenience function for starting the builder pattern.
///
/// # Example
/// ```ignore
/// let client = submux::builder()
///     .url("wss://api.example.com/graphql")
///     .token(StaticToken::new(std::env::var("AUTH_TOKEN")?))
///     .build()
///     .await?;
/// ```
pub fn builder() -> SubMuxBuilder<builder::states::NoUrl> {
    SubMuxBuilder::new()
}
