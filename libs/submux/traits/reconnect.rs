use std::time::Duration;

/// Trait for defining reconnection backoff policies
///
/// The lifecycle manager consults the policy between connection attempts.
/// The attempt counter is owned by the lifecycle manager and reset to zero
/// after any Ready period that outlasts the configured stability threshold.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before reconnection attempt `attempt` (0-indexed).
    ///
    /// `None` stops reconnecting: the client transitions to Closed and all
    /// handles terminate.
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Whether attempt `attempt` should be made at all.
    fn should_reconnect(&self, attempt: usize) -> bool;
}

/// Exponential backoff: `initial * 2^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// # Arguments
    /// * `initial` - delay before the first retry
    /// * `max` - cap on the delay between retries
    /// * `max_attempts` - maximum number of attempts (None = unlimited)
    pub fn new(initial: Duration, max: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial,
            max,
            max_attempts,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }
        // Clamp the shift so large attempt numbers saturate instead of
        // overflowing the multiplication.
        let factor = 1u64 << attempt.min(31) as u32;
        let ms = (self.initial.as_millis() as u64)
            .saturating_mul(factor)
            .min(self.max.as_millis() as u64);
        Some(Duration::from_millis(ms))
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Fixed delay between reconnection attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Never reconnect: the first disconnect terminates the client.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn should_reconnect(&self, _attempt: usize) -> bool {
        false
    }
}
