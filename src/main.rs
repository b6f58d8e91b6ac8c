//! Sentiflow CLI: run posts from a file or stdin through the staged pipeline.

use anyhow::Result;
use clap::Parser;
use sentiflow::engine::arg_parser::Cli;
use sentiflow::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
