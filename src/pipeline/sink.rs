//! Terminal stage: drain values and errors under the run's cancel token.

use anyhow::Error;
use crossbeam_channel::{Receiver, never, select};
use log::{error, info, warn};

use super::cancel::{CANCELLED, CancelToken};
use crate::utils::config::PipelineDefaults;
use crate::{ErrorPolicy, Summary, Termination};

type ProgressFn = Box<dyn FnMut(u64) + Send>;
type ValueFn<T> = Box<dyn FnMut(T) + Send>;

enum Drained<T> {
    Cancelled,
    Error(Error),
    ErrorsClosed,
    Value(T),
    ValuesClosed,
}

pub struct Sink<T> {
    progress_every: u64,
    policy: ErrorPolicy,
    on_progress: Option<ProgressFn>,
    on_value: Option<ValueFn<T>>,
}

impl<T> Default for Sink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Sink<T> {
    pub fn new() -> Self {
        Self {
            progress_every: PipelineDefaults::PROGRESS_EVERY,
            policy: ErrorPolicy::default(),
            on_progress: None,
            on_value: None,
        }
    }

    /// Progress cadence in values; clamped to at least 1.
    pub fn progress_every(mut self, n: u64) -> Self {
        self.progress_every = n.max(1);
        self
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Called with the running count every `progress_every` values. Without it the count is logged.
    pub fn on_progress(mut self, f: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Terminal consumer for every value drained.
    pub fn on_value(mut self, f: impl FnMut(T) + Send + 'static) -> Self {
        self.on_value = Some(Box::new(f));
        self
    }

    /// Drain until the values channel closes (`Completed`) or `ctx` trips (`Cancelled`).
    ///
    /// Under [`ErrorPolicy::CancelOnFirst`] the first error cancels `ctx` with the error's text
    /// as reason; errors arriving afterwards are logged only. A closed errors channel is not
    /// terminal. Errors still queued when values close are handled before deciding the outcome.
    pub fn drain(mut self, ctx: &CancelToken, values: Receiver<T>, errors: Receiver<Error>) -> Summary {
        let mut count = 0_u64;
        let mut error_count = 0_u64;
        let mut errors = errors;

        let reason = loop {
            let event = select! {
                recv(ctx.done()) -> _ => Drained::Cancelled,
                recv(errors) -> msg => msg.map_or(Drained::ErrorsClosed, Drained::Error),
                recv(values) -> msg => msg.map_or(Drained::ValuesClosed, Drained::Value),
            };
            match event {
                Drained::Cancelled => {
                    for e in errors.try_iter() {
                        error_count += 1;
                        warn!("error after cancellation: {:#}", e);
                    }
                    break cancelled(ctx);
                }
                Drained::Error(e) => {
                    error_count += 1;
                    self.handle_error(ctx, e);
                }
                Drained::ErrorsClosed => errors = never(),
                Drained::Value(v) => {
                    count += 1;
                    if let Some(f) = self.on_value.as_mut() {
                        f(v);
                    }
                    if count.is_multiple_of(self.progress_every) {
                        match self.on_progress.as_mut() {
                            Some(f) => f(count),
                            None => info!("Item count: {}", count),
                        }
                    }
                }
                Drained::ValuesClosed => {
                    for e in errors.try_iter() {
                        error_count += 1;
                        self.handle_error(ctx, e);
                    }
                    if ctx.is_cancelled() {
                        break cancelled(ctx);
                    }
                    info!("done");
                    break Termination::Completed;
                }
            }
        };

        Summary {
            count,
            errors: error_count,
            reason,
        }
    }

    fn handle_error(&self, ctx: &CancelToken, e: Error) {
        match self.policy {
            ErrorPolicy::CancelOnFirst => {
                if ctx.cancel(format!("{:#}", e)) {
                    error!("error: {:#}", e);
                } else {
                    warn!("error after cancellation: {:#}", e);
                }
            }
            ErrorPolicy::Continue => error!("error: {:#}", e),
        }
    }
}

fn cancelled(ctx: &CancelToken) -> Termination {
    let reason = ctx.reason().unwrap_or(CANCELLED).to_string();
    info!("{}", reason);
    Termination::Cancelled(reason)
}
