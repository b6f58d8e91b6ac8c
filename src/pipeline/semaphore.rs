//! Counting semaphore bounding concurrent transforms.
//!
//! Slots are messages in a bounded channel of capacity `limit`: acquiring sends one in (blocks
//! when full), releasing takes one out. That makes acquire selectable against cancellation.

use crossbeam_channel::{Receiver, Select, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::cancel::CancelToken;

pub struct Semaphore {
    limit: usize,
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Semaphore {
    /// `limit` is clamped to at least 1.
    pub fn new(limit: usize) -> Arc<Self> {
        let limit = limit.max(1);
        let (slots_tx, slots_rx) = bounded(limit);
        Arc::new(Self {
            limit,
            slots_tx,
            slots_rx,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest [`in_flight`](Self::in_flight) value observed since creation.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Block until a slot is free or `ctx` trips. `None` means cancelled.
    pub fn acquire(self: &Arc<Self>, ctx: &CancelToken) -> Option<Permit> {
        if ctx.is_cancelled() {
            return None;
        }
        let mut sel = Select::new();
        let slot_idx = sel.send(&self.slots_tx);
        let done_idx = sel.recv(ctx.done());
        let oper = sel.select();
        if oper.index() == slot_idx {
            // We hold slots_rx, so the channel cannot be disconnected.
            oper.send(&self.slots_tx, ()).ok()?;
            Some(self.granted())
        } else {
            debug_assert_eq!(oper.index(), done_idx);
            let _ = oper.recv(ctx.done());
            None
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        self.slots_tx.try_send(()).ok()?;
        Some(self.granted())
    }

    /// Block until every permit has been returned: take all `limit` slots, then give them back.
    /// Not cancellable; running transforms always get to finish.
    pub fn wait_idle(&self) {
        for _ in 0..self.limit {
            let _ = self.slots_tx.send(());
        }
        for _ in 0..self.limit {
            let _ = self.slots_rx.try_recv();
        }
    }

    fn granted(self: &Arc<Self>) -> Permit {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Permit {
            sem: Arc::clone(self),
        }
    }
}

/// One unit of semaphore capacity. Released on drop, including during a panic unwind.
pub struct Permit {
    sem: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.sem.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _ = self.sem.slots_rx.try_recv();
    }
}
