//! Demo pipeline wiring: feed → normalize → split → tag × N → merge → sink.

use anyhow::{Result, anyhow};
use crossbeam_channel::unbounded;
use log::{debug, warn};
use std::sync::Arc;

use crate::engine::transforms;
use crate::pipeline::{
    CancelToken, Feed, Sink, Step, Subject, generate, merge_into, spawn_split, with_capacity,
};
use crate::utils::config::PipelineDefaults;
use crate::{FeedOutcome, GeneratorReport, Opts, Post, RunReport, Tagged};

/// Optional callbacks and listeners for [`run_posts`].
#[derive(Default)]
pub struct RunHooks {
    /// Terminal consumer for every tagged post.
    pub on_tagged: Option<Box<dyn FnMut(Tagged) + Send>>,
    /// Progress sink, called with the running count every `opts.progress_every` posts.
    pub on_progress: Option<Box<dyn FnMut(u64) + Send>>,
    /// Listeners for per-item step events.
    pub subject: Option<Arc<Subject>>,
}

fn observed<In, Out>(step: Step<In, Out>, subject: &Option<Arc<Subject>>) -> Step<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    match subject {
        Some(s) => step.observe(Arc::clone(s)),
        None => step,
    }
}

/// Run the demo pipeline over `feed` until it is exhausted or `ctx` trips, and join every stage.
///
/// Returns `Err` only for setup failures (invalid opts, feed handshake) or a panicked stage;
/// transform errors and cancellation are reported in the [`RunReport`].
pub fn run_posts<F>(ctx: &CancelToken, feed: F, opts: &Opts, hooks: RunHooks) -> Result<RunReport>
where
    F: Feed<Item = Post>,
{
    opts.validate()?;
    let cap = opts.channel_capacity;

    let (posts_rx, generator) = generate(ctx, feed, cap)?;
    let (err_tx, err_rx) = unbounded::<anyhow::Error>();

    // Layer 1: normalize
    let (norm_tx, norm_rx) = with_capacity(cap);
    let normalize = Step::new("normalize", transforms::normalize).limit(opts.limit);
    let mut step_handles =
        vec![observed(normalize, &hooks.subject).spawn(ctx, posts_rx, norm_tx, err_tx.clone())];

    // Fan-out to tagging branches
    let (branch_txs, branch_rxs): (Vec<_>, Vec<_>) =
        (0..opts.branches).map(|_| with_capacity(cap)).unzip();
    let split_handle = spawn_split(ctx, norm_rx, branch_txs);

    // Layer 2: tag, one step per branch
    let mut tagged_rxs = Vec::with_capacity(opts.branches);
    for (i, branch_rx) in branch_rxs.into_iter().enumerate() {
        let (tagged_tx, tagged_rx) = with_capacity(cap);
        let tag = Step::new(format!("tag-{i}"), transforms::tag).limit(opts.limit);
        step_handles.push(observed(tag, &hooks.subject).spawn(
            ctx,
            branch_rx,
            tagged_tx,
            err_tx.clone(),
        ));
        tagged_rxs.push(tagged_rx);
    }
    // Steps hold the remaining error senders; the channel closes when the last one exits.
    drop(err_tx);

    // Fan-in
    let (merged_tx, merged_rx) = with_capacity(cap);
    let merge = merge_into(merged_tx, tagged_rxs);

    let mut sink = Sink::new()
        .progress_every(opts.progress_every)
        .policy(opts.error_policy);
    if let Some(f) = hooks.on_tagged {
        sink = sink.on_value(f);
    }
    if let Some(f) = hooks.on_progress {
        sink = sink.on_progress(f);
    }
    let summary = sink.drain(ctx, merged_rx, err_rx);
    debug!("sink: {} posts, {}", summary.count, summary.reason);

    let generator = if summary.reason.is_cancelled() {
        generator.join_timeout(PipelineDefaults::GENERATOR_GRACE)?
    } else {
        Some(generator.join()?)
    };
    match &generator {
        None => warn!("generator still blocked on its feed after cancellation; detached"),
        Some(GeneratorReport {
            outcome: FeedOutcome::Failed(msg),
            emitted,
        }) => warn!("feed failed after {} posts: {}", emitted, msg),
        Some(_) => {}
    }
    let split = split_handle
        .join()
        .map_err(|_| anyhow!("split thread panicked"))?;
    let steps = step_handles
        .into_iter()
        .map(|h| h.join().map_err(|_| anyhow!("step thread panicked")))
        .collect::<Result<Vec<_>>>()?;
    let merged = merge.join()?;

    Ok(RunReport {
        summary,
        generator,
        steps,
        split,
        merged,
    })
}
