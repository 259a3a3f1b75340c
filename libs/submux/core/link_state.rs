//! Atomic connection state and metrics
//!
//! Mirrors the lifecycle manager's state machine into an atomic so callers
//! can observe it without touching the lifecycle task.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// State of the single physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    /// No connection held and none being attempted.
    Idle = 0,
    /// Opening the physical connection.
    Connecting = 1,
    /// Connection open, awaiting connection_ack.
    Handshaking = 2,
    /// Steady state: subscriptions active, frames flowing.
    Ready = 3,
    /// Tearing down a dead connection.
    Draining = 4,
    /// Waiting out the backoff delay before the next attempt.
    BackoffWait = 5,
    /// Terminal: explicit shutdown or exhausted/futile retries.
    Closed = 6,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LinkState::Idle,
            1 => LinkState::Connecting,
            2 => LinkState::Handshaking,
            3 => LinkState::Ready,
            4 => LinkState::Draining,
            5 => LinkState::BackoffWait,
            _ => LinkState::Closed,
        }
    }
}

/// Lock-free holder for the current [`LinkState`].
pub struct AtomicLinkState(AtomicU8);

impl AtomicLinkState {
    pub fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.get() == LinkState::Ready
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.get() == LinkState::Closed
    }
}

/// Lock-free engine counters.
#[derive(Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnects: AtomicU64,
    events_dispatched: AtomicU64,
    events_dropped: AtomicU64,
    stale_dropped: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnects: u64,
    pub events_dispatched: u64,
    /// Events evicted under the drop-oldest delivery policy. An event is
    /// never lost without this counter moving.
    pub events_dropped: u64,
    /// Frames that carried an unknown or stale-generation subscription id.
    pub stale_dropped: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_frames_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale_dropped(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
        }
    }
}
