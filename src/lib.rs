//! Sentiflow: staged stream pipeline engine.
//!
//! A [`Feed`](pipeline::Feed) is pulled by a generator, items flow through bounded-concurrency
//! [`Step`](pipeline::Step)s, can be split and merged, and end in a [`Sink`](pipeline::Sink),
//! with one [`CancelToken`](pipeline::CancelToken) shared by every stage.

pub mod engine;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use log::debug;

/// Result alias used by public sentiflow API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: run posts from `feed` through the demo pipeline with `opts` and return the report.
///
/// - **`on_tagged: None`** → posts are only counted.
/// - **`on_tagged: Some(f)`** → `f` is the terminal consumer, invoked for each tagged post as it
///   is drained. It runs on the caller's thread; keep it fast or send to a channel.
///
/// Uses a fresh cancel token. For Ctrl+C handling, listeners or progress, call
/// [`engine::run_posts`] with your own token and [`engine::RunHooks`].
pub fn run<F, C>(feed: F, opts: &Opts, on_tagged: Option<C>) -> Result<RunReport>
where
    F: pipeline::Feed<Item = Post>,
    C: FnMut(Tagged) + Send + 'static,
{
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        opts
    );
    let ctx = pipeline::CancelToken::new();
    let hooks = engine::RunHooks {
        on_tagged: on_tagged.map(|f| Box::new(f) as Box<dyn FnMut(Tagged) + Send>),
        ..Default::default()
    };
    engine::run_posts(&ctx, feed, opts, hooks)
}
