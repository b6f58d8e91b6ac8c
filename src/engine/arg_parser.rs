use clap::Parser;
use std::path::PathBuf;

/// Staged stream pipeline over posts: normalize, fan out, tag, fan in, drain.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "sentiflow")]
#[command(about = "Run posts (one per line) through a bounded-concurrency pipeline.")]
pub struct Cli {
    /// Input file with one post per line. Default: stdin.
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Only process posts containing one of these phrases (case-insensitive). Can specify multiple.
    #[arg(long, short = 't', num_args = 1..)]
    pub track: Vec<String>,

    /// Max concurrent transforms per step. Default: number of CPU threads.
    #[arg(long, short = 'j', value_parser = clap::value_parser!(usize))]
    pub limit: Option<usize>,

    /// Tagging branches behind the fan-out.
    #[arg(long, short = 'b', value_parser = clap::value_parser!(usize))]
    pub branches: Option<usize>,

    /// Report progress every N posts.
    #[arg(long, short = 'p', value_parser = clap::value_parser!(u64))]
    pub progress_every: Option<u64>,

    /// Capacity of channels between stages. Default: unbounded.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub capacity: Option<usize>,

    /// Keep going after transform errors instead of cancelling the run.
    #[arg(long, short = 'k', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub keep_going: Option<bool>,

    /// Verbose output (debug logs, progress counter).
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Log start/stop of every item in every step.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub trace: Option<bool>,

    /// Print the run report as JSON instead of one line per post.
    #[arg(long)]
    pub json: bool,

    /// Config file. Default: `.sentiflow.toml` in the working directory, if present.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}
