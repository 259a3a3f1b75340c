pub mod states;

use crate::core::client::SubscriptionClient;
use crate::core::config::{ClientConfig, DeliveryPolicy, Keepalive};
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`SubscriptionClient`]
///
/// The URL is the only required field and the type system enforces it:
/// `build()` only exists once `url()` has been called. Everything else has
/// a sensible default.
///
/// ```ignore
/// let client = submux::builder()
///     .url("wss://api.example.com/graphql")
///     .token(StaticToken::new(token))
///     .keepalive(Duration::from_secs(15), Duration::from_secs(45))
///     .build()
///     .await?;
/// ```
pub struct SubMuxBuilder<U>
where
    U: UrlState,
{
    _state: TypeState<U>,
    url: Option<String>,
    headers: Headers,
    token: Option<Arc<dyn TokenProvider>>,
    transport: Option<Arc<dyn Transport>>,
    reconnect: Option<Box<dyn ReconnectPolicy>>,
    handshake_timeout: Duration,
    keepalive: Option<Keepalive>,
    stability_threshold: Duration,
    queue_capacity: usize,
    delivery_policy: DeliveryPolicy,
    shutdown_grace: Duration,
    max_handshake_rejections: u32,
}

impl SubMuxBuilder<NoUrl> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            headers: Headers::new(),
            token: None,
            transport: None,
            reconnect: None,
            handshake_timeout: Duration::from_secs(10),
            keepalive: None,
            stability_threshold: Duration::from_secs(30),
            queue_capacity: 1024,
            delivery_policy: DeliveryPolicy::Block,
            shutdown_grace: Duration::from_secs(3),
            max_handshake_rejections: 5,
        }
    }
}

impl Default for SubMuxBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

// URL setting
impl SubMuxBuilder<NoUrl> {
    pub fn url(self, url: impl Into<String>) -> SubMuxBuilder<HasUrl> {
        SubMuxBuilder {
            _state: TypeState::new(),
            url: Some(url.into()),
            headers: self.headers,
            token: self.token,
            transport: self.transport,
            reconnect: self.reconnect,
            handshake_timeout: self.handshake_timeout,
            keepalive: self.keepalive,
            stability_threshold: self.stability_threshold,
            queue_capacity: self.queue_capacity,
            delivery_policy: self.delivery_policy,
            shutdown_grace: self.shutdown_grace,
            max_handshake_rejections: self.max_handshake_rejections,
        }
    }
}

// Optional configuration methods
impl<U> SubMuxBuilder<U>
where
    U: UrlState,
{
    /// Add one extra header to the connection upgrade request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Credential source consulted before every handshake, so a refreshed
    /// token is picked up on reconnect without rebuilding the client.
    pub fn token(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token = Some(Arc::new(provider));
        self
    }

    pub fn reconnect_policy(mut self, policy: impl ReconnectPolicy + 'static) -> Self {
        self.reconnect = Some(Box::new(policy));
        self
    }

    /// Bound on the ConnectionInit -> ConnectionAck wait. Default 10s.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Enable protocol-level Ping frames while Ready.
    ///
    /// A Ping goes out every `interval`; a connection whose Pong is more
    /// than `timeout` overdue is declared dead and recycled. A timeout of
    /// roughly 3x the interval works well.
    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive = Some(Keepalive { interval, timeout });
        self
    }

    /// A Ready period at least this long resets the backoff schedule.
    /// Default 30s.
    pub fn stability_threshold(mut self, threshold: Duration) -> Self {
        self.stability_threshold = threshold;
        self
    }

    /// Per-subscription delivery queue capacity, in events. Default 1024.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// What happens when a delivery queue fills up. Default
    /// [`DeliveryPolicy::Block`].
    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    /// Bound on the best-effort goodbye exchange at shutdown. Default 3s.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Consecutive handshake rejections after which the client gives up and
    /// fails every subscription instead of hammering a server that will
    /// never accept it. Default 5.
    pub fn max_handshake_rejections(mut self, max: u32) -> Self {
        self.max_handshake_rejections = max;
        self
    }

    /// Swap out the wire transport. Tests use this to run the client
    /// against an in-process fake.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

// Build method - only available once the URL is set
impl SubMuxBuilder<HasUrl> {
    /// Validate the configuration and spawn the lifecycle task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<SubscriptionClient> {
        let url = match self.url {
            Some(url) if !url.is_empty() => url,
            _ => return Err(SubMuxError::Configuration("url must not be empty".into())),
        };
        if self.queue_capacity == 0 {
            return Err(SubMuxError::Configuration(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.max_handshake_rejections == 0 {
            return Err(SubMuxError::Configuration(
                "max handshake rejections must be at least 1".into(),
            ));
        }

        let reconnect = self.reconnect.unwrap_or_else(|| {
            Box::new(ExponentialBackoff::new(
                Duration::from_millis(500),
                Duration::from_secs(30),
                None,
            ))
        });

        let config = ClientConfig {
            url,
            headers: self.headers,
            token: self.token.unwrap_or_else(|| Arc::new(NoToken)),
            transport: self.transport.unwrap_or_else(|| Arc::new(WsTransport)),
            reconnect,
            handshake_timeout: self.handshake_timeout,
            keepalive: self.keepalive,
            stability_threshold: self.stability_threshold,
            queue_capacity: self.queue_capacity,
            delivery_policy: self.delivery_policy,
            shutdown_grace: self.shutdown_grace,
            max_handshake_rejections: self.max_handshake_rejections,
        };

        Ok(SubscriptionClient::spawn(config))
    }
}
