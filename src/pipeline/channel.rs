//! Item channels between stages.
//!
//! A channel is closed when its last [`Sender`] is dropped, so "exactly one owner closes it"
//! comes down to who holds the senders: each stage drops its clone when it stops writing.

use crossbeam_channel::{Receiver, Select, Sender, TrySendError, bounded, unbounded};

use super::cancel::CancelToken;

/// Unbounded when `capacity` is `None`, bounded otherwise.
pub fn with_capacity<T>(capacity: Option<usize>) -> (Sender<T>, Receiver<T>) {
    match capacity {
        Some(cap) => bounded(cap),
        None => unbounded(),
    }
}

/// Result of [`forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    Delivered,
    /// The channel was full and the token tripped while waiting.
    Discarded,
    /// No receiver left.
    Disconnected,
}

/// Send `item`, blocking while the channel is full, but give up if `ctx` trips while blocked.
///
/// A send that can complete without blocking always completes, even after cancellation.
pub fn forward<T>(ctx: &CancelToken, tx: &Sender<T>, item: T) -> Forwarded {
    let item = match tx.try_send(item) {
        Ok(()) => return Forwarded::Delivered,
        Err(TrySendError::Disconnected(_)) => return Forwarded::Disconnected,
        Err(TrySendError::Full(item)) => item,
    };

    let mut sel = Select::new();
    let send_idx = sel.send(tx);
    let done_idx = sel.recv(ctx.done());
    let oper = sel.select();
    match oper.index() {
        i if i == send_idx => match oper.send(tx, item) {
            Ok(()) => Forwarded::Delivered,
            Err(_) => Forwarded::Disconnected,
        },
        i => {
            debug_assert_eq!(i, done_idx);
            let _ = oper.recv(ctx.done());
            Forwarded::Discarded
        }
    }
}
