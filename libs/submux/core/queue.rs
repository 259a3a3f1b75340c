//! Bounded per-subscription delivery queue
//!
//! One queue per subscription, single producer (the lifecycle task) and
//! single consumer (the subscription handle). Queues are independent: a full
//! queue only ever stalls its own producer call, never another subscription's
//! queue.
//!
//! Two full-queue behaviors are offered, matching [`DeliveryPolicy`]:
//! [`DeliveryQueue::push`] awaits free space (backpressure), while
//! [`DeliveryQueue::push_evicting`] evicts the oldest buffered item and
//! reports it so the caller can count the drop.
//!
//! Closing is cooperative: buffered items remain pullable after `close`, the
//! consumer observes `None` only once the buffer is drained.
//!
//! [`DeliveryPolicy`]: crate::core::config::DeliveryPolicy

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Outcome of a non-waiting push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Delivered,
    /// Delivered, but the oldest buffered item was evicted to make room.
    Evicted,
    Closed,
}

struct Inner<T> {
    buf: VecDeque<T>,
    closed: bool,
}

pub(crate) struct DeliveryQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    /// Wakes a producer blocked on a full queue.
    space: Notify,
    /// Wakes the consumer waiting for items.
    items: Notify,
}

impl<T: Send> DeliveryQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                closed: false,
            }),
            capacity,
            space: Notify::new(),
            items: Notify::new(),
        }
    }

    /// Push, waiting for free space when the queue is full.
    ///
    /// Returns `false` if the queue was closed before the item could be
    /// buffered.
    pub async fn push(&self, item: T) -> bool {
        loop {
            // Arm the waiter before the check so a notify between unlock and
            // await is not lost.
            let space = self.space.notified();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return false;
                }
                if inner.buf.len() < self.capacity {
                    inner.buf.push_back(item);
                    drop(inner);
                    self.items.notify_one();
                    return true;
                }
            }
            space.await;
        }
    }

    /// Push without waiting; evicts the oldest buffered item when full.
    pub fn push_evicting(&self, item: T) -> PushOutcome {
        let mut inner = self.inner.lock();
        if inner.closed {
            return PushOutcome::Closed;
        }
        let evicted = if inner.buf.len() >= self.capacity {
            inner.buf.pop_front();
            true
        } else {
            false
        };
        inner.buf.push_back(item);
        drop(inner);
        self.items.notify_one();
        if evicted {
            PushOutcome::Evicted
        } else {
            PushOutcome::Delivered
        }
    }

    /// Buffer one final item past the capacity bound and close the queue.
    ///
    /// Terminal markers (subscription error/complete) must reach the consumer
    /// even when the queue is full, so the bound is exceeded by at most one.
    pub fn close_with(&self, item: T) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.buf.push_back(item);
            inner.closed = true;
        }
        drop(inner);
        self.items.notify_one();
        self.space.notify_one();
    }

    /// Close without a terminal marker (consumer-initiated cancel and
    /// shutdown). Buffered items stay pullable.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.items.notify_one();
        self.space.notify_one();
    }

    /// Pull the next item; `None` once the queue is closed and drained.
    pub async fn pull(&self) -> Option<T> {
        loop {
            let items = self.items.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.buf.pop_front() {
                    drop(inner);
                    self.space.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            items.await;
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().buf.len()
    }
}
