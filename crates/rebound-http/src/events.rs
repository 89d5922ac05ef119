//! Request lifecycle events.
//!
//! Listeners are registered per [`EventKind`] and invoked synchronously, in
//! registration order, at fixed points of each attempt. A panicking listener
//! unwinds through the request that emitted the event.

use crate::error::{HttpError, RequestError};
use crate::request::RequestOptions;
use crate::response::Response;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Event kinds a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    End,
    Error,
    Retry,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Start,
        EventKind::End,
        EventKind::Error,
        EventKind::Retry,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Start => "request:start",
            EventKind::End => "request:end",
            EventKind::Error => "request:error",
            EventKind::Retry => "request:retry",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lifecycle event, borrowed for the duration of dispatch.
#[derive(Debug)]
pub enum RequestEvent<'a> {
    /// An attempt is about to be sent.
    Start {
        url: &'a str,
        options: &'a RequestOptions,
    },
    /// A response arrived, successful or not.
    End {
        url: &'a str,
        response: &'a Response,
        duration: Duration,
    },
    /// An attempt failed.
    Error {
        url: &'a str,
        error: &'a RequestError,
        attempt: u32,
    },
    /// A retry was scheduled after the failed `attempt`.
    Retry {
        url: &'a str,
        error: &'a HttpError,
        attempt: u32,
    },
}

impl RequestEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            RequestEvent::Start { .. } => EventKind::Start,
            RequestEvent::End { .. } => EventKind::End,
            RequestEvent::Error { .. } => EventKind::Error,
            RequestEvent::Retry { .. } => EventKind::Retry,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            RequestEvent::Start { url, .. }
            | RequestEvent::End { url, .. }
            | RequestEvent::Error { url, .. }
            | RequestEvent::Retry { url, .. } => url,
        }
    }

    /// Attempt number for error and retry events.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            RequestEvent::Error { attempt, .. } | RequestEvent::Retry { attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        }
    }
}

/// A subscribed callback.
pub type Listener = Arc<dyn Fn(&RequestEvent<'_>) + Send + Sync>;

/// Ordered listener lists keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&RequestEvent<'_>) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Remove every listener for `kind`.
    pub fn clear(&self, kind: EventKind) {
        self.listeners.write().remove(&kind);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    /// Dispatch `event` to its listeners.
    ///
    /// The list is snapshotted first so a listener may subscribe others.
    pub fn emit(&self, event: &RequestEvent<'_>) {
        let listeners = match self.listeners.read().get(&event.kind()) {
            Some(listeners) => listeners.clone(),
            None => return,
        };
        for listener in &listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let mut debug = f.debug_struct("EventBus");
        for kind in EventKind::ALL {
            debug.field(kind.name(), &listeners.get(&kind).map_or(0, Vec::len));
        }
        debug.finish()
    }
}
