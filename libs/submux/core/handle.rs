//! Consumer-facing subscription handle
//!
//! A handle is the pull end of one subscription's delivery queue. The
//! consumer drives it from its own task; the engine never calls back into
//! consumer code from the read loop, which is what keeps one slow consumer
//! from stalling the multiplexer.

use crate::core::client::Command;
use crate::core::registry::{EventQueue, SubscriptionRegistry};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One delivered item of a subscription's event sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// A data payload, in server emission order.
    Next(Value),
    /// The server terminated this subscription with an error. Terminal;
    /// other subscriptions and the connection are unaffected.
    Failed(Value),
    /// The server completed this subscription normally. Terminal.
    Completed,
}

/// Handle to one logical subscription.
///
/// The event sequence is conceptually infinite and spans reconnects
/// transparently; it ends only on [`cancel`](Self::cancel), a server
/// error/complete, or client shutdown. A terminated subscription is not
/// restartable; register a new one instead.
pub struct SubscriptionHandle {
    key: String,
    queue: EventQueue,
    registry: Arc<SubscriptionRegistry>,
    command_tx: mpsc::UnboundedSender<Command>,
    canceled: AtomicBool,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        key: String,
        queue: EventQueue,
        registry: Arc<SubscriptionRegistry>,
        command_tx: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            key,
            queue,
            registry,
            command_tx,
            canceled: AtomicBool::new(false),
        }
    }

    /// The stable client-assigned key of this subscription.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pull the next event. `None` once the sequence has terminated and all
    /// buffered events are drained.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.queue.pull().await
    }

    /// Cancel this subscription. Idempotent; already-buffered events remain
    /// pullable. If the subscription is active on the current connection, a
    /// best-effort unsubscribe frame goes out.
    pub fn cancel(&self) {
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some((wire_id, queue)) = self.registry.remove(&self.key) else {
            // Already gone: terminated by the server or by shutdown.
            return;
        };
        queue.close();
        debug!(key = %self.key, "subscription canceled");
        if let Some(wire_id) = wire_id {
            // Lifecycle task gone means the connection is too; nothing to
            // unsubscribe from.
            let _ = self.command_tx.send(Command::Unsubscribe { wire_id });
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        // The handle is the only consumer; once it is gone nobody will drain
        // the queue, so the registration must go too.
        self.cancel();
    }
}
