//! Shared cancellation token: one-way `Active -> Cancelled` switch with a reason.
//!
//! Cancelling drops the only sender of an internal channel, so every clone's [`CancelToken::done`]
//! receiver becomes ready at once and can sit inside a `select!` next to data channels.

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::thread;
use std::time::Duration;

/// Reason recorded by [`CancelToken::cancel_default`].
pub const CANCELLED: &str = "context canceled";
/// Reason recorded when a child token's deadline passes.
pub const DEADLINE_EXCEEDED: &str = "context deadline exceeded";

struct Inner {
    reason: OnceLock<String>,
    cancelled: AtomicBool,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        Self {
            reason: OnceLock::new(),
            cancelled: AtomicBool::new(false),
            done_tx: Mutex::new(Some(tx)),
            done_rx: rx,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self, reason: String) -> bool {
        // OnceLock is the gate: only the first caller gets to set the reason.
        if self.reason.set(reason).is_err() {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        drop(self.done_tx.lock().unwrap_or_else(PoisonError::into_inner).take());

        let children =
            std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        let reason = self.reason.get().cloned().unwrap_or_default();
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason.clone());
        }
        true
    }
}

/// Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Trip the token. Returns `true` only for the call that actually cancelled it; later calls are no-ops.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let first = self.inner.cancel(reason.into());
        if first {
            debug!("cancel: {}", self.reason().unwrap_or(CANCELLED));
        }
        first
    }

    pub fn cancel_default(&self) -> bool {
        self.cancel(CANCELLED)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Reason passed to the first successful [`cancel`](Self::cancel); `None` while active.
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }

    /// Receiver that never yields a message and disconnects on cancellation. Use in `select!`.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let _ = self.inner.done_rx.recv();
    }

    /// Block until cancelled or `timeout` passes. Returns whether the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let _ = self.inner.done_rx.recv_timeout(timeout);
        self.is_cancelled()
    }

    /// New token that is cancelled whenever this one is (with the parent's reason), but can also
    /// be cancelled on its own without touching the parent.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Parent may have tripped between the flag store and our push.
        if let Some(reason) = self.reason() {
            child.cancel(reason.to_string());
        }
        child
    }

    /// Child token that also trips with [`DEADLINE_EXCEEDED`] once `timeout` has elapsed.
    ///
    /// The deadline watcher holds only a weak reference: it exits when the child is cancelled
    /// or when every handle to the child has been dropped, whichever comes first.
    pub fn child_with_timeout(&self, timeout: Duration) -> CancelToken {
        let child = self.child();
        let weak = Arc::downgrade(&child.inner);
        // Disconnects on cancel, or when the last handle drops `Inner` (and its sender).
        let done = child.inner.done_rx.clone();
        thread::spawn(move || {
            let deadline = after(timeout);
            select! {
                recv(done) -> _ => {},
                recv(deadline) -> _ => {
                    if let Some(inner) = weak.upgrade()
                        && inner.cancel(DEADLINE_EXCEEDED.to_string())
                    {
                        debug!("cancel: {}", DEADLINE_EXCEEDED);
                    }
                },
            }
        });
        child
    }
}
