//! Subscription registry
//!
//! The single serialization point for subscription state. One mutex guards:
//!
//! - the *desired* set: every registered request, in insertion order,
//!   surviving reconnects until explicitly canceled or terminated,
//! - the *active* map: wire id → client key for the current connection
//!   generation only, cleared whenever the connection dies,
//! - the generation counter, bumped on each successful handshake.
//!
//! Wire ids are client-assigned as `"{generation}:{key}"`. Because the active
//! map is rebuilt per generation, a frame tagged with a stale generation's id
//! resolves to nothing and is dropped, which is exactly the staleness
//! guarantee the dispatcher needs.

use crate::core::handle::SubscriptionEvent;
use crate::core::queue::DeliveryQueue;
use crate::traits::{Result, SubMuxError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Consumer-declared subscription intent. Immutable once created.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    /// Stable client-assigned key; survives reconnects.
    pub key: String,
    /// The subscription document.
    pub query: String,
    pub variables: Option<Value>,
}

pub(crate) type EventQueue = Arc<DeliveryQueue<SubscriptionEvent>>;

struct Entry {
    request: SubscriptionRequest,
    queue: EventQueue,
    /// Wire id on the current generation, if the subscribe frame went out.
    wire_id: Option<String>,
}

struct RegistryInner {
    /// Keys in insertion order; drives deterministic replay.
    order: Vec<String>,
    desired: HashMap<String, Entry>,
    /// Wire id -> client key, current generation only.
    active: HashMap<String, String>,
    generation: u64,
}

pub(crate) struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                order: Vec::new(),
                desired: HashMap::new(),
                active: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// Register a request and hand back its delivery queue.
    pub fn add(&self, request: SubscriptionRequest, capacity: usize) -> Result<EventQueue> {
        let mut inner = self.inner.lock();
        if inner.desired.contains_key(&request.key) {
            return Err(SubMuxError::DuplicateKey(request.key));
        }
        let queue = Arc::new(DeliveryQueue::new(capacity));
        inner.order.push(request.key.clone());
        inner.desired.insert(
            request.key.clone(),
            Entry {
                request,
                queue: Arc::clone(&queue),
                wire_id: None,
            },
        );
        Ok(queue)
    }

    /// Remove a request. Returns its active wire id (if any) and queue so the
    /// caller can emit an unsubscribe frame and close the queue. `None` if
    /// the key was already gone, which makes removal idempotent.
    pub fn remove(&self, key: &str) -> Option<(Option<String>, EventQueue)> {
        let mut inner = self.inner.lock();
        let entry = inner.desired.remove(key)?;
        inner.order.retain(|k| k != key);
        if let Some(id) = &entry.wire_id {
            inner.active.remove(id);
        }
        Some((entry.wire_id, entry.queue))
    }

    /// Every desired request, in insertion order.
    pub fn snapshot(&self) -> Vec<SubscriptionRequest> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|key| inner.desired.get(key).map(|e| e.request.clone()))
            .collect()
    }

    /// Start a new connection generation: bump the counter and forget every
    /// active id of the previous one.
    pub fn begin_generation(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.active.clear();
        for entry in inner.desired.values_mut() {
            entry.wire_id = None;
        }
        inner.generation
    }

    /// Invalidate the current generation's active ids without bumping the
    /// counter; called on disconnect.
    pub fn drop_generation(&self) {
        let mut inner = self.inner.lock();
        inner.active.clear();
        for entry in inner.desired.values_mut() {
            entry.wire_id = None;
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Mark `key` active on the current generation and mint its wire id.
    ///
    /// Returns `None` if the key is not desired (canceled meanwhile) or is
    /// already active this generation, so at most one subscribe frame goes
    /// out per (generation, key).
    pub fn activate(&self, key: &str) -> Option<(String, SubscriptionRequest)> {
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        let entry = inner.desired.get_mut(key)?;
        if entry.wire_id.is_some() {
            return None;
        }
        let wire_id = format!("{generation}:{key}");
        entry.wire_id = Some(wire_id.clone());
        let request = entry.request.clone();
        inner.active.insert(wire_id.clone(), key.to_string());
        Some((wire_id, request))
    }

    /// Resolve an inbound frame's wire id to its delivery queue.
    pub fn queue_for(&self, wire_id: &str) -> Option<EventQueue> {
        let inner = self.inner.lock();
        let key = inner.active.get(wire_id)?;
        inner.desired.get(key).map(|e| Arc::clone(&e.queue))
    }

    /// Terminal server frame for `wire_id`: drop both the active entry and
    /// the desired request, returning the queue for the terminal event.
    pub fn finish(&self, wire_id: &str) -> Option<EventQueue> {
        let mut inner = self.inner.lock();
        let key = inner.active.remove(wire_id)?;
        let entry = inner.desired.remove(&key)?;
        inner.order.retain(|k| k != &key);
        Some(entry.queue)
    }

    /// Wire ids active on the current generation, in insertion order; used
    /// for best-effort unsubscribes at shutdown.
    pub fn active_wire_ids(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|key| inner.desired.get(key).and_then(|e| e.wire_id.clone()))
            .collect()
    }

    /// The generation a wire id was minted on.
    pub fn wire_generation(wire_id: &str) -> Option<u64> {
        wire_id.split_once(':')?.0.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().desired.is_empty()
    }

    /// Close every queue and clear all state. Terminal: used at shutdown.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock();
        for entry in inner.desired.values() {
            entry.queue.close();
        }
        inner.desired.clear();
        inner.order.clear();
        inner.active.clear();
    }

    /// Close every queue with a terminal error event; used when retries have
    /// become futile and the whole client gives up.
    pub fn fail_all(&self, payload: Value) {
        let mut inner = self.inner.lock();
        for entry in inner.desired.values() {
            entry
                .queue
                .close_with(SubscriptionEvent::Failed(payload.clone()));
        }
        inner.desired.clear();
        inner.order.clear();
        inner.active.clear();
    }
}
