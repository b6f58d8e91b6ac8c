//! Bounded step: apply a transform to every input item with at most `limit` calls in flight.
//!
//! Dispatch loop: take a permit, wait for an item (or cancellation), hand the item to the
//! worker pool. Workers write the result to `out` or the error to `errs`, then release the
//! permit. Once input is exhausted the step waits for all permits before dropping `out`.
//! Results are not ordered.

use anyhow::{Error, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, select};
use log::{debug, error, warn};
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::cancel::CancelToken;
use super::channel::{Forwarded, forward};
use super::observer::{Event, Subject};
use super::semaphore::Semaphore;
use crate::StepReport;
use crate::utils::config::default_limit;

type Transform<In, Out> = dyn Fn(&CancelToken, In) -> Result<Out> + Send + Sync;

pub struct Step<In, Out> {
    name: Arc<str>,
    limit: usize,
    transform: Arc<Transform<In, Out>>,
    subject: Option<Arc<Subject>>,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

enum Next<T> {
    Item(T),
    Closed,
    Cancelled,
}

impl<In, Out> Step<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Step running `transform` on each item. Limit defaults to host parallelism.
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(In) -> Result<Out> + Send + Sync + 'static,
    {
        Self::with_context(name, move |_, item| transform(item))
    }

    /// Like [`new`](Self::new), but the transform also gets the run's token, e.g. to derive
    /// a [`child_with_timeout`](CancelToken::child_with_timeout) for its own deadline.
    pub fn with_context<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&CancelToken, In) -> Result<Out> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            limit: default_limit(),
            transform: Arc::new(transform),
            subject: None,
        }
    }

    /// Max concurrent transforms; clamped to at least 1.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Emit [`Event`]s for every item to `subject`'s listeners.
    pub fn observe(mut self, subject: Arc<Subject>) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the step on a new thread.
    pub fn spawn(
        self,
        ctx: &CancelToken,
        input: Receiver<In>,
        out: Sender<Out>,
        errs: Sender<Error>,
    ) -> JoinHandle<StepReport> {
        let ctx = ctx.clone();
        thread::spawn(move || self.run(&ctx, input, out, errs))
    }

    /// Run the step on the current thread until input is exhausted or `ctx` trips.
    /// `out` and `errs` are dropped (this step's share of them closed) only after every
    /// dispatched transform has finished writing.
    pub fn run(
        self,
        ctx: &CancelToken,
        input: Receiver<In>,
        out: Sender<Out>,
        errs: Sender<Error>,
    ) -> StepReport {
        let mut report = StepReport {
            name: self.name.to_string(),
            ..Default::default()
        };

        let pool_name = Arc::clone(&self.name);
        let pool = match ThreadPoolBuilder::new()
            .num_threads(self.limit)
            .thread_name(move |i| format!("{pool_name}-{i}"))
            .panic_handler(|payload| error!("worker panicked: {}", panic_message(&*payload)))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("step '{}': could not start workers: {}", self.name, e);
                let _ = errs.send(anyhow!(e).context(format!("step '{}' worker pool", self.name)));
                report.aborted = true;
                return report;
            }
        };

        let sem = Semaphore::new(self.limit);
        let counters = Arc::new(Counters::default());
        debug!("step '{}': started (limit {})", self.name, self.limit);

        loop {
            let Some(permit) = sem.acquire(ctx) else {
                debug!("step '{}': cancelled while waiting for a permit", self.name);
                report.aborted = true;
                break;
            };
            let next = if ctx.is_cancelled() {
                Next::Cancelled
            } else {
                select! {
                    recv(input) -> msg => msg.map_or(Next::Closed, Next::Item),
                    recv(ctx.done()) -> _ => Next::Cancelled,
                }
            };
            let item = match next {
                Next::Item(item) => item,
                Next::Closed => break,
                Next::Cancelled => {
                    debug!("step '{}': abort, no new items", self.name);
                    report.aborted = true;
                    break;
                }
            };

            report.dispatched += 1;
            let seq = report.dispatched;
            let job = Job {
                name: Arc::clone(&self.name),
                seq,
                ctx: ctx.clone(),
                transform: Arc::clone(&self.transform),
                subject: self.subject.clone(),
                counters: Arc::clone(&counters),
                out: out.clone(),
                errs: errs.clone(),
            };
            pool.spawn(move || {
                job.run(item);
                drop(permit);
            });
        }

        sem.wait_idle();
        drop(out);
        drop(errs);

        report.succeeded = counters.succeeded.load(Ordering::SeqCst);
        report.failed = counters.failed.load(Ordering::SeqCst);
        report.discarded = counters.discarded.load(Ordering::SeqCst);
        report.peak_in_flight = sem.peak();
        debug!(
            "step '{}': done ({} dispatched, {} ok, {} failed)",
            self.name, report.dispatched, report.succeeded, report.failed
        );
        report
    }
}

/// Everything a worker needs for one item. Dropped (senders included) before the permit.
struct Job<In, Out> {
    name: Arc<str>,
    seq: u64,
    ctx: CancelToken,
    transform: Arc<Transform<In, Out>>,
    subject: Option<Arc<Subject>>,
    counters: Arc<Counters>,
    out: Sender<Out>,
    errs: Sender<Error>,
}

impl<In, Out> Job<In, Out> {
    fn run(self, item: In) {
        if let Some(subject) = &self.subject {
            subject.notify(&Event::Started {
                step: Arc::clone(&self.name),
                seq: self.seq,
            });
        }
        let started = Instant::now();

        let transform = &self.transform;
        let ctx = &self.ctx;
        let result = catch_unwind(AssertUnwindSafe(|| transform(ctx, item))).unwrap_or_else(
            |payload| Err(anyhow!("transform panicked: {}", panic_message(&*payload))),
        );

        if let Some(subject) = &self.subject {
            subject.notify(&Event::Finished {
                step: Arc::clone(&self.name),
                seq: self.seq,
                ok: result.is_ok(),
                elapsed: started.elapsed(),
            });
        }

        let forwarded = match result {
            Ok(value) => {
                self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
                forward(&self.ctx, &self.out, value)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                let e = e.context(format!("step '{}' item #{}", self.name, self.seq));
                // The error is gone once forward gives up on it; keep its text for the log.
                let text = format!("{:#}", e);
                let forwarded = forward(&self.ctx, &self.errs, e);
                if forwarded != Forwarded::Delivered {
                    warn!("error not delivered ({:?}): {}", forwarded, text);
                }
                forwarded
            }
        };
        if forwarded != Forwarded::Delivered {
            self.counters.discarded.fetch_add(1, Ordering::SeqCst);
            debug!(
                "step '{}': item #{} not forwarded ({:?})",
                self.name, self.seq, forwarded
            );
        }
    }
}

pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
