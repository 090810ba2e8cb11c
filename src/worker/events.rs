//! Lifecycle event subscriptions.
//!
//! Listeners are registered per [`EventKind`] and removed by the
//! [`ListenerId`] returned at registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Names of the events a connection emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Opened,
    Closed,
    Error,
}

/// An emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The executor opened its database handle.
    Opened,
    /// `close()` completed.
    Closed,
    /// The executor reported a failure not tied to any call.
    Error(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Opened => EventKind::Opened,
            Event::Closed => EventKind::Closed,
            Event::Error(_) => EventKind::Error,
        }
    }
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Registry of event listeners.
#[derive(Default)]
pub struct EventHub {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.write() {
            listeners
                .entry(kind)
                .or_default()
                .push((id, Arc::new(listener)));
        }
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.write() else {
            return false;
        };
        for list in listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Call every listener registered for the event's kind.
    ///
    /// Listeners run outside the registry lock, so they may register or
    /// remove listeners themselves.
    pub fn emit(&self, event: &Event) {
        let targets: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        debug!(event = ?event.kind(), listeners = targets.len(), "emitting event");
        for listener in targets {
            listener(event);
        }
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .map(|l| l.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}
