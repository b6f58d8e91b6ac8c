//! Engine module: the demo post pipeline and the CLI around it.

pub mod arg_parser;
pub mod cli;
pub mod core;
pub mod progress;
pub mod transforms;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::{apply_cli_to_opts, build_opts, ensure_clean_run, handle_run};
pub use self::core::{RunHooks, run_posts};
pub use transforms::{normalize, tag};
