//! Progress counter for the sink (kdam), used as its progress callback in verbose mode.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for an open-ended stream (count without percentage).
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " posts"
    )))
}

/// Force a refresh of the bar (e.g. so the counter shows "0 posts" immediately).
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.refresh();
    }
}

/// Advance the bar by `n`. Uses try_lock so a contended bar never blocks the caller;
/// a skipped update is caught up by the next one.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Sink progress callback: the sink reports every `every` values, so each call advances by `every`.
pub fn progress_callback(bar: &ProgressBar, every: u64) -> Box<dyn FnMut(u64) + Send> {
    let bar = Arc::clone(bar);
    let step = usize::try_from(every).unwrap_or(usize::MAX);
    Box::new(move |_count: u64| update_progress_bar(&bar, step))
}

/// Final update for the remainder after batched updates, then a newline-terminated refresh.
pub fn finish_counter(pb: &ProgressBar, total: u64, every: u64) {
    let remaining = total % every.max(1);
    if remaining > 0 {
        update_progress_bar(pb, usize::try_from(remaining).unwrap_or(usize::MAX));
    }
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
        eprintln!();
    }
}
