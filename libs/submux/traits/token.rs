use async_trait::async_trait;

/// Trait for supplying the credential sent with each handshake
///
/// The provider is consulted once per handshake attempt, so an external
/// refresh loop can rotate tokens without the engine noticing: the next
/// reconnect simply picks up the fresh value.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current bearer token, or `None` for an unauthenticated handshake.
    async fn current_token(&self) -> Option<String>;
}

/// A provider that always returns the same token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn current_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// A no-op provider for servers that do not authenticate.
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn current_token(&self) -> Option<String> {
        None
    }
}
