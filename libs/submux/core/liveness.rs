//! Keep-alive liveness tracking
//!
//! Detects zombie connections: a connection is declared dead when a protocol
//! Ping goes unanswered for longer than the configured timeout. Timestamps
//! are stored as microseconds past an internal epoch so the tracker is plain
//! atomics, readable from any task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub(crate) struct Liveness {
    epoch: Instant,
    ping_sent_us: AtomicU64,
    pong_seen_us: AtomicU64,
    timeout: Duration,
}

impl Liveness {
    /// `timeout` is how long a Ping may go unanswered; a sensible value is
    /// 2-3x the ping interval.
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            ping_sent_us: AtomicU64::new(0),
            pong_seen_us: AtomicU64::new(0),
            timeout,
        }
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Record an outbound Ping. While one is already unanswered the original
    /// timestamp is kept, so periodic re-pings cannot push the pong deadline
    /// out indefinitely. Single writer: the lifecycle task.
    pub fn mark_ping(&self) {
        let prev = self.ping_sent_us.load(Ordering::Acquire);
        if prev != 0 && self.pong_seen_us.load(Ordering::Acquire) < prev {
            return;
        }
        self.ping_sent_us.store(self.now_us(), Ordering::Release);
    }

    pub fn mark_pong(&self) {
        self.pong_seen_us.store(self.now_us(), Ordering::Release);
    }

    /// False once a Ping has gone unanswered past the timeout.
    pub fn is_live(&self) -> bool {
        let ping = self.ping_sent_us.load(Ordering::Acquire);
        if ping == 0 {
            // Nothing sent yet, nothing to judge.
            return true;
        }
        if self.pong_seen_us.load(Ordering::Acquire) >= ping {
            return true;
        }
        self.now_us().saturating_sub(ping) < self.timeout.as_micros() as u64
    }
}
