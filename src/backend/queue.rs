//! Bounded event handoff between a backend's native thread and the owning
//! thread
//!
//! The native thread holds an [`EventSink`] and pushes translated events; the
//! backend drains its [`EventQueue`] inside `pump`. Once full, the oldest
//! event is dropped to make room.

use super::BackendEvent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default number of events buffered per backend
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
struct Inner {
    items: VecDeque<BackendEvent>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

/// Receiving side, owned by the backend
#[derive(Debug)]
pub struct EventQueue {
    inner: Arc<Mutex<Inner>>,
}

/// Sending side, moved into a native event thread
#[derive(Debug, Clone)]
pub struct EventSink {
    inner: Arc<Mutex<Inner>>,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
                dropped: 0,
                closed: false,
            })),
        }
    }

    pub fn sink(&self) -> EventSink {
        EventSink {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take every queued event in arrival order
    pub fn drain(&self) -> Vec<BackendEvent> {
        match self.inner.lock() {
            Ok(mut inner) => inner.items.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().items.drain(..).collect(),
        }
    }

    /// Number of events dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.inner.lock().map(|inner| inner.dropped).unwrap_or(0)
    }

    /// Tell sinks to stop; further pushes are refused
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventSink {
    /// Queue an event; returns false once the receiving side is closed
    pub fn push(&self, event: BackendEvent) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return false,
        };
        if inner.closed {
            return false;
        }
        if inner.items.len() == inner.capacity {
            inner.items.pop_front();
            inner.dropped += 1;
            if inner.dropped.is_power_of_two() {
                log::warn!("Event queue full, {} events dropped so far", inner.dropped);
            }
        }
        inner.items.push_back(event);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|inner| inner.closed).unwrap_or(true)
    }
}
