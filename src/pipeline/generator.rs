//! Source generator: pull items from a [`Feed`] on its own thread and push them downstream.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::cancel::CancelToken;
use super::channel::{Forwarded, forward, with_capacity};
use crate::{FeedOutcome, GeneratorReport, Post};

/// External source of items (a file, a subscription client, ...).
///
/// `connect` runs on the caller's thread before anything is spawned, so a failed handshake is
/// returned straight to the caller. `next_item` runs on the generator thread; `None` ends the
/// feed, `Some(Err)` is a fatal feed error. Blocking feeds should watch `ctx` while they wait.
pub trait Feed: Send + 'static {
    type Item: Send + 'static;

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_item(&mut self, ctx: &CancelToken) -> Option<Result<Self::Item>>;
}

/// Join handle for a generator thread.
pub struct GeneratorHandle {
    report_rx: Receiver<GeneratorReport>,
    thread: JoinHandle<()>,
}

impl GeneratorHandle {
    /// Wait for the generator to finish.
    pub fn join(self) -> Result<GeneratorReport> {
        let report = self.report_rx.recv();
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("generator thread panicked"))?;
        report.map_err(|_| anyhow::anyhow!("generator exited without a report"))
    }

    /// Wait at most `timeout`. `Ok(None)` means the generator is still running (typically
    /// blocked inside its feed); the thread is detached.
    pub fn join_timeout(self, timeout: Duration) -> Result<Option<GeneratorReport>> {
        match self.report_rx.recv_timeout(timeout) {
            Ok(report) => {
                let _ = self.thread.join();
                Ok(Some(report))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow::anyhow!("generator thread panicked"))
            }
        }
    }
}

/// Connect `feed`, then spawn a thread copying its items into the returned receiver.
///
/// The output closes exactly once, when the thread exits: feed exhausted, feed failed,
/// cancellation, or nobody left to receive. `capacity: None` means unbounded.
pub fn generate<F: Feed>(
    ctx: &CancelToken,
    mut feed: F,
    capacity: Option<usize>,
) -> Result<(Receiver<F::Item>, GeneratorHandle)> {
    feed.connect().context("connect feed")?;

    let (tx, rx) = with_capacity(capacity);
    let (report_tx, report_rx) = bounded(1);
    let ctx = ctx.clone();
    let thread = thread::spawn(move || {
        let report = run_feed_loop(&ctx, &mut feed, tx);
        let _ = report_tx.send(report);
    });
    Ok((rx, GeneratorHandle { report_rx, thread }))
}

fn run_feed_loop<F: Feed>(ctx: &CancelToken, feed: &mut F, tx: Sender<F::Item>) -> GeneratorReport {
    let mut emitted = 0_u64;
    let outcome = loop {
        if ctx.is_cancelled() {
            break FeedOutcome::Cancelled;
        }
        match feed.next_item(ctx) {
            None if ctx.is_cancelled() => break FeedOutcome::Cancelled,
            None => break FeedOutcome::Exhausted,
            Some(Err(e)) => {
                warn!("feed error: {:#}", e);
                break FeedOutcome::Failed(format!("{:#}", e));
            }
            Some(Ok(item)) => match forward(ctx, &tx, item) {
                Forwarded::Delivered => emitted += 1,
                Forwarded::Discarded => break FeedOutcome::Cancelled,
                Forwarded::Disconnected => break FeedOutcome::Detached,
            },
        }
    };
    drop(tx);
    debug!("generator: {} items emitted, {:?}", emitted, outcome);
    GeneratorReport { emitted, outcome }
}

/// Feed over any iterator of plain items.
pub struct IterFeed<I>(I);

impl<I> IterFeed<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self(iter.into_iter())
    }
}

impl<I> Feed for IterFeed<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    fn next_item(&mut self, _ctx: &CancelToken) -> Option<Result<Self::Item>> {
        self.0.next().map(Ok)
    }
}

/// Feed over an iterator of results; the first `Err` ends the feed as a failure.
pub struct TryIterFeed<I>(I);

impl<I> TryIterFeed<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self(iter.into_iter())
    }
}

impl<I, T> Feed for TryIterFeed<I>
where
    I: Iterator<Item = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    fn next_item(&mut self, _ctx: &CancelToken) -> Option<Result<T>> {
        self.0.next()
    }
}

/// Feed fed by an external client through a channel (e.g. a streaming subscription).
/// Ends when the client drops its sender; stops waiting when the token trips.
pub struct ReceiverFeed<T> {
    rx: Receiver<T>,
}

impl<T> ReceiverFeed<T> {
    pub fn new(rx: Receiver<T>) -> Self {
        Self { rx }
    }
}

impl<T: Send + 'static> Feed for ReceiverFeed<T> {
    type Item = T;

    fn next_item(&mut self, ctx: &CancelToken) -> Option<Result<T>> {
        select! {
            recv(self.rx) -> msg => msg.ok().map(Ok),
            recv(ctx.done()) -> _ => None,
        }
    }
}

enum LineSource {
    Path(PathBuf),
    Reader(Box<dyn BufRead + Send>),
}

/// Reads [`Post`]s line by line. Blank lines are skipped; with tracked phrases, only lines
/// containing at least one of them (case-insensitive) are emitted. Post ids are line numbers.
pub struct LineFeed {
    source: Option<LineSource>,
    reader: Option<Box<dyn BufRead + Send>>,
    track: Vec<String>,
    line_no: u64,
}

impl LineFeed {
    /// Feed from a file; the file is opened in [`Feed::connect`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_source(LineSource::Path(path.into()))
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self::with_source(LineSource::Reader(Box::new(reader)))
    }

    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(std::io::stdin()))
    }

    fn with_source(source: LineSource) -> Self {
        Self {
            source: Some(source),
            reader: None,
            track: Vec::new(),
            line_no: 0,
        }
    }

    pub fn track<S: AsRef<str>>(mut self, phrases: &[S]) -> Self {
        self.track = phrases
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }
}

fn is_tracked(track: &[String], line: &str) -> bool {
    if track.is_empty() {
        return true;
    }
    let lower = line.to_lowercase();
    track.iter().any(|p| lower.contains(p.as_str()))
}

impl Feed for LineFeed {
    type Item = Post;

    fn connect(&mut self) -> Result<()> {
        let reader: Box<dyn BufRead + Send> = match self.source.take() {
            Some(LineSource::Path(path)) => {
                let file = File::open(&path)
                    .with_context(|| format!("open input {}", path.display()))?;
                info!("Reading posts from {}", path.display());
                Box::new(BufReader::new(file))
            }
            Some(LineSource::Reader(reader)) => reader,
            None => anyhow::bail!("line feed already connected"),
        };
        if !self.track.is_empty() {
            info!("Tracking: {}", self.track.join(", "));
        }
        self.reader = Some(reader);
        Ok(())
    }

    fn next_item(&mut self, ctx: &CancelToken) -> Option<Result<Post>> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Some(Err(anyhow::anyhow!("line feed not connected"))),
        };
        let mut buf = Vec::new();
        loop {
            if ctx.is_cancelled() {
                return None;
            }
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let line = match std::str::from_utf8(&buf) {
                        Ok(line) => Cow::Borrowed(line),
                        Err(_) => {
                            warn!("line {}: invalid UTF-8, replacing bad bytes", self.line_no);
                            String::from_utf8_lossy(&buf)
                        }
                    };
                    let text = line.trim_end_matches(['\n', '\r']);
                    if text.trim().is_empty() || !is_tracked(&self.track, text) {
                        continue;
                    }
                    return Some(Ok(Post {
                        id: self.line_no,
                        text: text.to_string(),
                    }));
                }
                Err(e) => {
                    return Some(
                        Err(e).with_context(|| format!("read line {}", self.line_no + 1)),
                    );
                }
            }
        }
    }
}
