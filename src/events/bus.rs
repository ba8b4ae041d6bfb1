//! Observer registry for queue lifecycle events
//!
//! Listeners register per [`EventKind`] and are invoked synchronously, in
//! registration order, when an event of that kind is emitted. A panic in a
//! listener propagates to whoever triggered the emitting operation; the bus
//! does not catch it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{EventKind, QueueEvent};
use crate::error::QueueError;

type Callback = std::sync::Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle {
    kind: EventKind,
    id: u64,
}

impl ListenerHandle {
    /// The event kind this handle was registered for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Synchronous fan-out registry, keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<(u64, Callback)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> ListenerHandle
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%kind, id, "EventBus::subscribe");
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners
            .entry(kind)
            .or_default()
            .push((id, std::sync::Arc::new(callback)));
        ListenerHandle { kind, id }
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> Result<(), QueueError> {
        debug!(%handle, "EventBus::unsubscribe");
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        let slot = listeners
            .get_mut(&handle.kind)
            .ok_or(QueueError::ListenerNotFound(handle))?;
        let position = slot
            .iter()
            .position(|(id, _)| *id == handle.id)
            .ok_or(QueueError::ListenerNotFound(handle))?;
        slot.remove(position);
        Ok(())
    }

    /// Remove every listener for `kind`, or every listener of any kind when
    /// `kind` is `None`.
    pub fn clear(&self, kind: Option<EventKind>) {
        debug!(?kind, "EventBus::clear");
        let mut listeners = self.listeners.lock().expect("listener registry poisoned");
        match kind {
            Some(kind) => {
                listeners.remove(&kind);
            }
            None => listeners.clear(),
        }
    }

    /// Invoke every listener registered for the event's kind, in
    /// registration order.
    ///
    /// The registry lock is released before callbacks run, so listeners may
    /// subscribe or unsubscribe re-entrantly; such changes take effect from
    /// the next emission.
    pub fn emit(&self, event: &QueueEvent) {
        let callbacks: Vec<Callback> = {
            let listeners = self.listeners.lock().expect("listener registry poisoned");
            match listeners.get(&event.kind()) {
                Some(slot) => slot.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };
        debug!(kind = %event.kind(), count = callbacks.len(), "EventBus::emit");
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.lock().expect("listener registry poisoned");
        listeners.get(&kind).map_or(0, Vec::len)
    }
}
