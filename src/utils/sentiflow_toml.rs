//! Load `.sentiflow.toml` (CLI only). Lib callers build [`Opts`] themselves.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{ErrorPolicy, Opts};

#[derive(Debug, Default, Deserialize)]
pub struct SentiflowToml {
    #[serde(default)]
    settings: PipelineSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineSection {
    input: Option<String>,
    track: Option<Vec<String>>,
    limit: Option<usize>,
    branches: Option<usize>,
    progress_every: Option<u64>,
    capacity: Option<usize>,
    error_policy: Option<ErrorPolicy>,
    verbose: Option<bool>,
    trace: Option<bool>,
}

/// Parse config text.
pub fn parse_sentiflow_toml(s: &str) -> Result<SentiflowToml> {
    toml::from_str(s).context("parse config")
}

/// Load `.sentiflow.toml` from `dir` if present. Returns None if missing or invalid (logged).
pub fn load_sentiflow_toml(dir: &Path) -> Option<SentiflowToml> {
    let path = dir.join(crate::utils::PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_sentiflow_toml(&s)
        .map_err(|e| log::warn!("{}: {:#}", path.display(), e))
        .ok()
}

/// Load an explicitly named config file; unlike [`load_sentiflow_toml`], a missing or invalid file is an error.
pub fn load_config_file(path: &Path) -> Result<SentiflowToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse_sentiflow_toml(&s).with_context(|| format!("in {}", path.display()))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
pub fn apply_file_to_opts(file: &SentiflowToml, opts: &mut Opts) {
    let section = &file.settings;
    if let Some(ref p) = section.input {
        opts.input = Some(PathBuf::from(p));
    }
    if section.capacity.is_some() {
        opts.channel_capacity = section.capacity;
    }
    apply_file_opt!(section, opts, track => track);
    apply_file_opt!(section, opts, limit => limit);
    apply_file_opt!(section, opts, branches => branches);
    apply_file_opt!(section, opts, progress_every => progress_every);
    apply_file_opt!(section, opts, error_policy => error_policy);
    apply_file_opt!(section, opts, verbose => verbose);
    apply_file_opt!(section, opts, trace => trace);
}
