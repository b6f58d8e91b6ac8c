//! CLI command handler: layer config, wire Ctrl+C to the cancel token, run, report.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

use crate::engine::arg_parser::Cli;
use crate::engine::core::{RunHooks, run_posts};
use crate::engine::progress::{create_counter, finish_counter, progress_callback, refresh_bar};
use crate::pipeline::{CancelToken, LineFeed, LogObserver, Subject};
use crate::utils::{
    apply_env_to_opts, apply_file_to_opts, load_config_file, load_dotenv, load_sentiflow_toml,
    setup_logging,
};
use crate::{ErrorPolicy, FeedOutcome, GeneratorReport, Opts, RunReport, Termination};

/// Overwrite opts with every flag given on the command line.
pub fn apply_cli_to_opts(cli: &Cli, opts: &mut Opts) {
    if let Some(ref p) = cli.input {
        opts.input = Some(p.clone());
    }
    if !cli.track.is_empty() {
        opts.track = cli.track.clone();
    }
    if let Some(v) = cli.limit {
        opts.limit = v;
    }
    if let Some(v) = cli.branches {
        opts.branches = v;
    }
    if let Some(v) = cli.progress_every {
        opts.progress_every = v;
    }
    if cli.capacity.is_some() {
        opts.channel_capacity = cli.capacity;
    }
    if let Some(keep_going) = cli.keep_going {
        opts.error_policy = if keep_going {
            ErrorPolicy::Continue
        } else {
            ErrorPolicy::CancelOnFirst
        };
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    if let Some(v) = cli.trace {
        opts.trace = v;
    }
    opts.json = cli.json;
}

/// Defaults → config file → environment (`lookup`) → CLI flags, then validate.
/// With `--config`, that file must exist; otherwise `.sentiflow.toml` in `dir` is optional.
pub fn build_opts(
    cli: &Cli,
    dir: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Opts> {
    let mut opts = Opts::default();
    match cli.config.as_deref() {
        Some(path) => apply_file_to_opts(&load_config_file(path)?, &mut opts),
        None => {
            if let Some(file) = load_sentiflow_toml(dir) {
                apply_file_to_opts(&file, &mut opts);
            }
        }
    }
    apply_env_to_opts(lookup, &mut opts)?;
    apply_cli_to_opts(cli, &mut opts);
    opts.validate()?;
    Ok(opts)
}

/// Run the pipeline for the CLI. Returns an error when the run was cancelled or the feed failed.
pub fn handle_run(cli: &Cli) -> Result<RunReport> {
    setup_logging(cli.verbose.unwrap_or(false) || cli.trace.unwrap_or(false));

    let cwd = std::env::current_dir().context("resolve working directory")?;
    load_dotenv(&cwd);
    let opts = build_opts(cli, &cwd, |k| std::env::var(k).ok())?;
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );

    let ctx = CancelToken::new();
    let handler_ctx = ctx.clone();
    ctrlc::set_handler(move || {
        handler_ctx.cancel("interrupted");
    })
    .context("set Ctrl+C handler")?;

    let feed = match &opts.input {
        Some(path) => LineFeed::open(path),
        None => LineFeed::stdin(),
    }
    .track(&opts.track);

    let subject = opts.trace.then(|| {
        let subject = Subject::new();
        subject.add_listener(Arc::new(LogObserver));
        subject
    });
    let bar = opts.verbose.then(|| {
        let bar = create_counter("Processing");
        refresh_bar(&bar);
        bar
    });
    let on_tagged: Option<Box<dyn FnMut(crate::Tagged) + Send>> = if opts.json {
        None
    } else {
        Some(Box::new(|t: crate::Tagged| println!("{}", t)))
    };
    let hooks = RunHooks {
        on_tagged,
        on_progress: bar
            .as_ref()
            .map(|b| progress_callback(b, opts.progress_every)),
        subject,
    };

    let report = run_posts(&ctx, feed, &opts, hooks)?;
    if let Some(bar) = &bar {
        finish_counter(bar, report.summary.count, opts.progress_every);
    }

    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize run report")?
        );
    } else {
        info!(
            "{} posts, {} errors, {}",
            report.summary.count, report.summary.errors, report.summary.reason
        );
    }

    ensure_clean_run(&report)?;
    Ok(report)
}

/// Error if the run was cancelled or its feed failed mid-stream; both exit non-zero.
pub fn ensure_clean_run(report: &RunReport) -> Result<()> {
    if let Termination::Cancelled(reason) = &report.summary.reason {
        anyhow::bail!("run cancelled: {}", reason);
    }
    if let Some(GeneratorReport {
        outcome: FeedOutcome::Failed(msg),
        emitted,
    }) = &report.generator
    {
        anyhow::bail!("feed failed after {} posts: {}", emitted, msg);
    }
    Ok(())
}
