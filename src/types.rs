//! Public and internal types for the sentiflow API and pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::utils::config::{PipelineDefaults, default_limit};

/// One item of the demo feed: a post read from the input, numbered from 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: u64,
    pub text: String,
}

/// A post after tagging: hashtags and mentions pulled out of the text (lowercased, without sigil).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tagged {
    pub id: u64,
    pub text: String,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
}

impl fmt::Display for Tagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}\t{}", self.id, self.text)?;
        if !self.hashtags.is_empty() || !self.mentions.is_empty() {
            let tags: Vec<String> = self
                .hashtags
                .iter()
                .map(|h| format!("#{h}"))
                .chain(self.mentions.iter().map(|m| format!("@{m}")))
                .collect();
            write!(f, "\t[{}]", tags.join(" "))?;
        }
        Ok(())
    }
}

/// What the sink does with an error it receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// First error cancels the whole run; later errors are only logged.
    #[default]
    CancelOnFirst,
    /// Errors are logged and counted; the run keeps going.
    Continue,
}

/// How a run ended. Entered exactly once by the sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason")]
pub enum Termination {
    Completed,
    Cancelled(String),
}

impl Termination {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Termination::Cancelled(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Completed => write!(f, "Completed"),
            Termination::Cancelled(reason) => write!(f, "Cancelled({reason})"),
        }
    }
}

/// Returned by [`Sink::drain`](crate::pipeline::Sink::drain): values counted, errors seen, terminal reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub errors: u64,
    pub reason: Termination,
}

/// Per-step counters, returned when a step finishes.
///
/// `dispatched == succeeded + failed` once the step has returned; `discarded` counts results
/// (or errors) that could not be forwarded because the run was cancelled or the receiver was gone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub discarded: u64,
    /// Highest number of transforms that were running at the same time.
    pub peak_in_flight: usize,
    /// True when the step stopped reading because of cancellation rather than input exhaustion.
    pub aborted: bool,
}

/// Why a generator stopped pulling from its feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason")]
pub enum FeedOutcome {
    /// Feed ended on its own.
    Exhausted,
    /// The cancel token tripped.
    Cancelled,
    /// The feed reported a fatal error mid-stream.
    Failed(String),
    /// Every receiver of the output channel was dropped.
    Detached,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GeneratorReport {
    pub emitted: u64,
    pub outcome: FeedOutcome,
}

/// Items delivered to each output of a splitter, plus items lost because no output could take them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    pub delivered: Vec<u64>,
    pub dropped: u64,
    pub cancelled: bool,
}

impl SplitReport {
    pub fn total(&self) -> u64 {
        self.delivered.iter().sum()
    }
}

/// Everything the demo pipeline reports after a run (see [`run_posts`](crate::engine::run_posts)).
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub summary: Summary,
    /// `None` when the generator was still blocked on its feed after cancellation and was detached.
    pub generator: Option<GeneratorReport>,
    pub steps: Vec<StepReport>,
    pub split: SplitReport,
    pub merged: usize,
}

/// Full options (CLI and lib). Built once at start and passed by reference.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Input file; `None` reads stdin.
    pub input: Option<PathBuf>,
    /// Only posts containing one of these phrases (case-insensitive) enter the pipeline. Empty = all.
    pub track: Vec<String>,
    /// Max concurrent transforms per step.
    pub limit: usize,
    /// Number of tagging branches behind the fan-out.
    pub branches: usize,
    /// Sink progress cadence (every N values).
    pub progress_every: u64,
    /// Capacity of inter-stage channels; `None` = unbounded, `Some(0)` = rendezvous.
    pub channel_capacity: Option<usize>,
    pub error_policy: ErrorPolicy,
    /// Show progress counter and debug logs.
    pub verbose: bool,
    /// Log per-item step events.
    pub trace: bool,
    /// Print the run report as JSON instead of per-post lines.
    pub json: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            input: None,
            track: Vec::new(),
            limit: default_limit(),
            branches: PipelineDefaults::BRANCHES,
            progress_every: PipelineDefaults::PROGRESS_EVERY,
            channel_capacity: None,
            error_policy: ErrorPolicy::default(),
            verbose: false,
            trace: false,
            json: false,
        }
    }
}

impl Opts {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.limit == 0 {
            anyhow::bail!("limit must be a positive integer");
        }
        if self.branches == 0 {
            anyhow::bail!("branches must be at least 1");
        }
        if self.progress_every == 0 {
            anyhow::bail!("progress_every must be at least 1");
        }
        Ok(())
    }
}
