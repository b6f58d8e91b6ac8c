//! Environment overrides: `SENTIFLOW_*` variables, optionally loaded from a `.env` file.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

use crate::Opts;
use crate::utils::config::PackagePaths;

/// Load `.env` from `dir` into the process environment if it exists. Existing variables win.
pub fn load_dotenv(dir: &Path) {
    let env_path = dir.join(".env");
    if env_path.is_file()
        && let Err(e) = dotenvy::from_path(&env_path)
    {
        log::warn!("{}: {}", env_path.display(), e);
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let name = PackagePaths::get().env_var(key);
    match lookup(&name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid {name}={raw:?}")),
        _ => Ok(None),
    }
}

/// Apply `SENTIFLOW_LIMIT`, `SENTIFLOW_PROGRESS_EVERY`, `SENTIFLOW_CAPACITY` and
/// `SENTIFLOW_BRANCHES` from `lookup` (usually `std::env::var`). Call after the file, before CLI.
pub fn apply_env_to_opts(lookup: impl Fn(&str) -> Option<String>, opts: &mut Opts) -> Result<()> {
    if let Some(v) = parse_var(&lookup, "LIMIT")? {
        opts.limit = v;
    }
    if let Some(v) = parse_var(&lookup, "PROGRESS_EVERY")? {
        opts.progress_every = v;
    }
    if let Some(v) = parse_var(&lookup, "CAPACITY")? {
        opts.channel_capacity = Some(v);
    }
    if let Some(v) = parse_var(&lookup, "BRANCHES")? {
        opts.branches = v;
    }
    Ok(())
}
