//! Lifecycle events and the fault-isolated emitter that fans them out.
//!
//! Dispatch is synchronous and in subscription order. A listener that
//! returns an error is logged and counted; the remaining listeners still
//! run and bar processing continues.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{Position, Trade};

/// Why a stop moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopUpdateCause {
    BreakEven,
    Trailing,
}

/// A lifecycle notification. Each variant carries an owned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EngineEvent {
    PositionOpened {
        bar_index: usize,
        position: Position,
    },
    PositionClosed {
        bar_index: usize,
        trade: Trade,
    },
    PartialClosed {
        bar_index: usize,
        trade: Trade,
        remaining: Position,
    },
    StopUpdated {
        bar_index: usize,
        previous: Option<f64>,
        stop: f64,
        cause: StopUpdateCause,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::PositionOpened { .. } => "position-opened",
            EngineEvent::PositionClosed { .. } => "position-closed",
            EngineEvent::PartialClosed { .. } => "partial-closed",
            EngineEvent::StopUpdated { .. } => "stop-updated",
        }
    }

    pub fn bar_index(&self) -> usize {
        match self {
            EngineEvent::PositionOpened { bar_index, .. }
            | EngineEvent::PositionClosed { bar_index, .. }
            | EngineEvent::PartialClosed { bar_index, .. }
            | EngineEvent::StopUpdated { bar_index, .. } => *bar_index,
        }
    }
}

/// Failure reported by a listener.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, e.g. a failed write in a recording listener.
    pub fn from_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A subscriber callback.
pub type Listener = Box<dyn FnMut(&EngineEvent) -> Result<(), ListenerError> + Send>;

/// Handle returned by [`EventEmitter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Ordered observer list with per-call fault isolation.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<(Subscription, Listener)>,
    next_id: u64,
    failures: usize,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&EngineEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        let handle = Subscription(self.next_id);
        self.next_id += 1;
        self.listeners.push((handle, Box::new(listener)));
        handle
    }

    /// Remove a listener. Returns false if the handle was already removed.
    pub fn unsubscribe(&mut self, handle: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(h, _)| *h != handle);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener. Returns how many succeeded.
    pub fn emit(&mut self, event: &EngineEvent) -> usize {
        let mut delivered = 0;
        for (handle, listener) in self.listeners.iter_mut() {
            match listener(event) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    self.failures += 1;
                    tracing::warn!(
                        subscription = %handle,
                        event = event.kind(),
                        bar = event.bar_index(),
                        error = %err,
                        "listener failed"
                    );
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Total listener failures since construction.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .field("failures", &self.failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn stop_event(bar_index: usize) -> EngineEvent {
        EngineEvent::StopUpdated {
            bar_index,
            previous: Some(95.0),
            stop: 100.0,
            cause: StopUpdateCause::BreakEven,
        }
    }

    #[test]
    fn dispatches_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut emitter = EventEmitter::new();
        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            emitter.subscribe(move |_event| {
                log.lock().unwrap().push(name);
                Ok(())
            });
        }
        assert_eq!(emitter.emit(&stop_event(1)), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn failing_listener_is_isolated() {
        let hits = Arc::new(Mutex::new(0));
        let mut emitter = EventEmitter::new();
        emitter.subscribe(|_| Err(ListenerError::new("boom")));
        let counter = Arc::clone(&hits);
        emitter.subscribe(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        assert_eq!(emitter.emit(&stop_event(1)), 1);
        assert_eq!(emitter.emit(&stop_event(2)), 1);
        assert_eq!(*hits.lock().unwrap(), 2);
        assert_eq!(emitter.failures(), 2);
    }

    #[test]
    fn listener_error_keeps_its_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed");
        let err = ListenerError::from_source(io);
        assert_eq!(err.message(), "sink closed");
        assert!(err.source().is_some());
        assert!(ListenerError::new("plain").source().is_none());
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let mut emitter = EventEmitter::new();
        let first = emitter.subscribe(|_| Ok(()));
        let _second = emitter.subscribe(|_| Ok(()));
        assert!(emitter.unsubscribe(first));
        assert!(!emitter.unsubscribe(first));
        assert_eq!(emitter.len(), 1);
        assert_eq!(emitter.emit(&stop_event(0)), 1);
    }

    #[test]
    fn event_kinds_are_kebab_case() {
        assert_eq!(stop_event(0).kind(), "stop-updated");
        let json = serde_json::to_string(&stop_event(3)).unwrap();
        assert!(json.contains("\"kind\":\"stop-updated\""));
        assert!(json.contains("\"cause\":\"break-even\""));
    }
}
