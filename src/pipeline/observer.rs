//! Listener registry for per-item step events.

use log::{debug, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use super::step::panic_message;

/// Emitted by a step around each transform call when a [`Subject`] is attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Started {
        step: Arc<str>,
        seq: u64,
    },
    Finished {
        step: Arc<str>,
        seq: u64,
        ok: bool,
        elapsed: Duration,
    },
}

pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Handle returned by [`Subject::add_listener`], used to remove the listener again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct Subject {
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, Arc<dyn Observer>)>>,
}

impl Subject {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_listener(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove_listener(&self, id: ObserverId) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener in registration order. A panicking listener is logged and skipped.
    pub fn notify(&self, event: &Event) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, observer) in observers.iter() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.notify(event))) {
                warn!(
                    "observer {:?} panicked: {}",
                    id,
                    panic_message(&*payload)
                );
            }
        }
    }
}

/// Writes events to the `log` facade at debug level.
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: &Event) {
        match event {
            Event::Started { step, seq } => debug!("[{step}] start #{seq}"),
            Event::Finished {
                step,
                seq,
                ok,
                elapsed,
            } => debug!(
                "[{step}] stop #{seq} ({}) after {elapsed:?}",
                if *ok { "ok" } else { "err" }
            ),
        }
    }
}
