use crate::traits::{Headers, ReconnectPolicy, TokenProvider, Transport};
use std::sync::Arc;
use std::time::Duration;

/// What to do when a subscription's delivery queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Wait for the consumer to free space. Backpressure reaches the read
    /// loop eventually, but no event is ever silently lost. Default.
    Block,
    /// Evict the oldest buffered event and count the drop in the metrics.
    DropOldest,
}

/// Protocol-level keep-alive settings.
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    /// How often a Ping frame is sent while Ready.
    pub interval: Duration,
    /// How long a Ping may go unanswered before the connection is declared
    /// dead and recycled.
    pub timeout: Duration,
}

/// Full configuration for a [`SubscriptionClient`], assembled by the builder.
///
/// [`SubscriptionClient`]: crate::core::client::SubscriptionClient
pub struct ClientConfig {
    pub(crate) url: String,
    pub(crate) headers: Headers,
    pub(crate) token: Arc<dyn TokenProvider>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) reconnect: Box<dyn ReconnectPolicy>,
    /// Bound on the ConnectionInit -> ConnectionAck wait.
    pub(crate) handshake_timeout: Duration,
    pub(crate) keepalive: Option<Keepalive>,
    /// A Ready period at least this long resets the backoff attempt counter.
    pub(crate) stability_threshold: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) delivery_policy: DeliveryPolicy,
    /// Bound on the best-effort unsubscribe/Bye exchange at shutdown.
    pub(crate) shutdown_grace: Duration,
    /// Consecutive handshake rejections after which retrying is futile.
    pub(crate) max_handshake_rejections: u32,
}
