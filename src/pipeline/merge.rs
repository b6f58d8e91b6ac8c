//! Fan-in: copy N input channels into one output.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Handles of the copy threads behind a merge.
pub struct MergeHandle {
    remaining: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<usize>>,
}

impl MergeHandle {
    /// Inputs not yet drained.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// True once every input is drained and the output has closed.
    pub fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }

    /// How many times the output was observed closing. Always 0 or 1.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Wait for every copy thread. Returns total items forwarded.
    pub fn join(self) -> Result<usize> {
        let mut total = 0;
        for h in self.handles {
            total += h
                .join()
                .map_err(|_| anyhow::anyhow!("merge thread panicked"))?;
        }
        Ok(total)
    }
}

/// Merge `ins` into a new unbounded channel. The copy threads are detached; use
/// [`merge_into`] to keep their handles.
pub fn merge<T: Send + 'static>(ins: Vec<Receiver<T>>) -> Receiver<T> {
    let (tx, rx) = unbounded();
    // Detached: the output still closes once every input drains. Join via `merge_into`.
    let _ = merge_into(tx, ins);
    rx
}

/// Copy every item of every input into `out`; one thread per input.
///
/// A counter starts at `ins.len()`; each thread drops its clone of `out` and then decrements
/// it. The thread that brings it to zero dropped the last sender, so the output is closed
/// exactly once and only after every input has been fully drained. No order across inputs.
pub fn merge_into<T: Send + 'static>(out: Sender<T>, ins: Vec<Receiver<T>>) -> MergeHandle {
    let remaining = Arc::new(AtomicUsize::new(ins.len()));
    let closes = Arc::new(AtomicUsize::new(0));

    if ins.is_empty() {
        drop(out);
        closes.fetch_add(1, Ordering::SeqCst);
        debug!("merge: no inputs, output closed");
        return MergeHandle {
            remaining,
            closes,
            handles: Vec::new(),
        };
    }

    let handles = ins
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            let out = out.clone();
            let remaining = Arc::clone(&remaining);
            let closes = Arc::clone(&closes);
            thread::spawn(move || {
                let mut copied = 0_usize;
                for item in input.iter() {
                    if out.send(item).is_err() {
                        debug!("merge: output receiver gone, input {} stops", i);
                        break;
                    }
                    copied += 1;
                }
                drop(out);
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    closes.fetch_add(1, Ordering::SeqCst);
                    debug!("merge: all inputs drained, output closed");
                }
                copied
            })
        })
        .collect();
    drop(out);

    MergeHandle {
        remaining,
        closes,
        handles,
    }
}
