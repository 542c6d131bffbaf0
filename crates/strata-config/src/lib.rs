//! Configuration for the Strata streaming engine.
//!
//! Settings persist to disk as `config.ron`, accept CLI overrides via clap,
//! and tolerate missing or unknown fields so older files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, CoverageConfig, DebugConfig, OverrideConfig, StreamingConfig, ViewerConfig,
    CONFIG_FILE_NAME, default_config_dir,
};
pub use error::ConfigError;
