//! Frame dispatcher
//!
//! Demultiplexes inbound data/error/complete frames to the matching
//! subscription's delivery queue using the registry's current-generation
//! active map. Frames carrying an unknown or stale id are counted and
//! dropped, never delivered (this covers both frames from a previous
//! connection generation and the race where a server error crosses a
//! client-initiated cancel on the wire).

use crate::core::config::DeliveryPolicy;
use crate::core::handle::SubscriptionEvent;
use crate::core::link_state::AtomicMetrics;
use crate::core::queue::PushOutcome;
use crate::core::registry::SubscriptionRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<AtomicMetrics>,
    policy: DeliveryPolicy,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        metrics: Arc<AtomicMetrics>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            registry,
            metrics,
            policy,
        }
    }

    /// Deliver one data event.
    ///
    /// Under [`DeliveryPolicy::Block`] this awaits free queue space, which
    /// stalls the caller (the read loop) until the consumer catches up; other
    /// subscriptions keep their already-buffered events flowing through
    /// their own queues meanwhile. Under [`DeliveryPolicy::DropOldest`] it
    /// never waits and the eviction is counted.
    pub async fn dispatch_next(&self, wire_id: &str, payload: Value) {
        let Some(queue) = self.registry.queue_for(wire_id) else {
            self.metrics.increment_stale_dropped();
            debug!(wire_id, "dropping data frame for unknown or stale id");
            return;
        };

        match self.policy {
            DeliveryPolicy::Block => {
                if queue.push(SubscriptionEvent::Next(payload)).await {
                    self.metrics.increment_events_dispatched();
                } else {
                    debug!(wire_id, "delivery queue closed mid-dispatch");
                }
            }
            DeliveryPolicy::DropOldest => match queue.push_evicting(SubscriptionEvent::Next(payload)) {
                PushOutcome::Delivered => self.metrics.increment_events_dispatched(),
                PushOutcome::Evicted => {
                    self.metrics.increment_events_dispatched();
                    self.metrics.increment_events_dropped();
                    warn!(wire_id, "full delivery queue, evicted oldest event");
                }
                PushOutcome::Closed => debug!(wire_id, "delivery queue closed mid-dispatch"),
            },
        }
    }

    /// Server error frame: terminal for this one subscription only.
    pub fn dispatch_error(&self, wire_id: &str, payload: Value) {
        match self.registry.finish(wire_id) {
            Some(queue) => {
                warn!(wire_id, "subscription terminated by server error");
                queue.close_with(SubscriptionEvent::Failed(payload));
            }
            None => {
                // Recommended policy for an error racing a cancel: the
                // consumer already considers the subscription closed.
                self.metrics.increment_stale_dropped();
                debug!(wire_id, "dropping error frame for unknown or stale id");
            }
        }
    }

    /// Server complete frame: normal termination of one subscription.
    pub fn dispatch_complete(&self, wire_id: &str) {
        match self.registry.finish(wire_id) {
            Some(queue) => {
                debug!(wire_id, "subscription completed by server");
                queue.close_with(SubscriptionEvent::Completed);
            }
            None => {
                self.metrics.increment_stale_dropped();
                debug!(wire_id, "dropping complete frame for unknown or stale id");
            }
        }
    }
}
