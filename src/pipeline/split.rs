//! Fan-out: load-balance one input across several outputs, each item to exactly one of them.

use crossbeam_channel::{Receiver, Select, Sender, select};
use log::debug;
use std::thread::{self, JoinHandle};

use super::cancel::CancelToken;
use crate::SplitReport;

enum Sent<T> {
    Delivered(usize),
    Retired(usize, T),
    Cancelled,
}

/// Deliver each item of `input` to whichever output is ready first; block when all are full.
///
/// Outputs whose receiver has gone are retired and the item is retried on the others. Stops
/// when `input` closes, every output is gone, or `ctx` trips; all outputs are dropped on exit.
pub fn split<T: Send>(ctx: &CancelToken, input: Receiver<T>, outs: Vec<Sender<T>>) -> SplitReport {
    let mut report = SplitReport {
        delivered: vec![0; outs.len()],
        ..Default::default()
    };
    if outs.is_empty() {
        debug!("split: no outputs, nothing to do");
        return report;
    }
    let mut live: Vec<Option<Sender<T>>> = outs.into_iter().map(Some).collect();

    'items: loop {
        let next = if ctx.is_cancelled() {
            None
        } else {
            select! {
                recv(input) -> msg => Some(msg.ok()),
                recv(ctx.done()) -> _ => None,
            }
        };
        let mut item = match next {
            Some(Some(item)) => item,
            Some(None) => break,
            None => {
                report.cancelled = true;
                break;
            }
        };

        loop {
            match send_to_ready(ctx, &live, item) {
                Sent::Delivered(i) => {
                    report.delivered[i] += 1;
                    continue 'items;
                }
                Sent::Retired(i, back) => {
                    debug!("split: output {} closed, retiring it", i);
                    live[i] = None;
                    if live.iter().all(Option::is_none) {
                        report.dropped += 1;
                        break 'items;
                    }
                    item = back;
                }
                Sent::Cancelled => {
                    report.dropped += 1;
                    report.cancelled = true;
                    break 'items;
                }
            }
        }
    }

    drop(live);
    debug!(
        "split: done, {} delivered across {} outputs",
        report.total(),
        report.delivered.len()
    );
    report
}

fn send_to_ready<T>(ctx: &CancelToken, live: &[Option<Sender<T>>], item: T) -> Sent<T> {
    let targets: Vec<(usize, &Sender<T>)> = live
        .iter()
        .enumerate()
        .filter_map(|(i, out)| out.as_ref().map(|out| (i, out)))
        .collect();
    let mut sel = Select::new();
    for &(_, out) in &targets {
        sel.send(out);
    }
    let done_idx = sel.recv(ctx.done());
    let oper = sel.select();
    let picked = oper.index();
    if picked == done_idx {
        let _ = oper.recv(ctx.done());
        return Sent::Cancelled;
    }
    let (i, out) = targets[picked];
    match oper.send(out, item) {
        Ok(()) => Sent::Delivered(i),
        Err(e) => Sent::Retired(i, e.into_inner()),
    }
}

/// Run [`split`] on its own thread.
pub fn spawn_split<T: Send + 'static>(
    ctx: &CancelToken,
    input: Receiver<T>,
    outs: Vec<Sender<T>>,
) -> JoinHandle<SplitReport> {
    let ctx = ctx.clone();
    thread::spawn(move || split(&ctx, input, outs))
}
