pub mod config;
pub mod env;
pub mod logger;
pub mod sentiflow_toml;

pub use config::*;
pub use env::{apply_env_to_opts, load_dotenv};
pub use logger::setup_logging;
pub use sentiflow_toml::{
    SentiflowToml, apply_file_to_opts, load_config_file, load_sentiflow_toml,
    parse_sentiflow_toml,
};
