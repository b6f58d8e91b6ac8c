//! Application configuration constants.
//! Tuning and defaults in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                env_prefix: format!("{}_", pkg.to_uppercase()),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory (e.g. `.sentiflow.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable name for `key`, e.g. `LIMIT` -> `SENTIFLOW_LIMIT`.
    pub fn env_var(&self, key: &str) -> String {
        format!("{}{}", self.env_prefix, key)
    }
}

// ---- Worker threads ----

/// Default concurrency limit for a step: host parallelism as seen by rayon.
pub fn default_limit() -> usize {
    rayon::current_num_threads().max(1)
}

// ---- Pipeline defaults ----

pub struct PipelineDefaults;

impl PipelineDefaults {
    /// Sink progress cadence (values between progress reports).
    pub const PROGRESS_EVERY: u64 = 100;
    /// Tagging branches behind the fan-out.
    pub const BRANCHES: usize = 2;
    /// How long to wait for a generator blocked in its feed after cancellation before detaching it.
    pub const GENERATOR_GRACE: Duration = Duration::from_secs(2);
}

// ---- Posts ----

/// Longest post (in chars) the normalize step accepts.
pub const MAX_POST_CHARS: usize = 280;
