//! Command-line argument parsing for the Strata viewer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata viewer command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata-viewer", about = "Headless sector streaming viewer")]
pub struct CliArgs {
    /// Model directory containing `scene.json` and `sectors/`.
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Number of update ticks to run.
    #[arg(long)]
    pub ticks: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Fetches allowed in flight per model.
    #[arg(long)]
    pub max_concurrent_fetches: Option<usize>,

    /// Ranked entries considered for fetching per tick.
    #[arg(long)]
    pub request_budget: Option<usize>,

    /// Force the CPU coverage renderer.
    #[arg(long)]
    pub software_coverage: bool,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.model_dir {
            self.viewer.model_dir = dir.display().to_string();
        }
        if let Some(ticks) = args.ticks {
            self.viewer.ticks = ticks;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(max) = args.max_concurrent_fetches {
            self.streaming.max_concurrent_fetches = max;
        }
        if let Some(budget) = args.request_budget {
            self.streaming.request_budget = budget;
        }
        if args.software_coverage {
            self.coverage.prefer_gpu = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            ticks: Some(10),
            request_budget: Some(5),
            software_coverage: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.viewer.ticks, 10);
        assert_eq!(config.streaming.request_budget, 5);
        assert!(!config.coverage.prefer_gpu);
        // Non-overridden fields retain defaults
        assert_eq!(config.streaming.max_concurrent_fetches, 20);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "strata-viewer",
            "--model-dir",
            "/tmp/model",
            "--max-concurrent-fetches",
            "3",
            "--software-coverage",
        ]);
        assert_eq!(args.model_dir, Some(PathBuf::from("/tmp/model")));
        assert_eq!(args.max_concurrent_fetches, Some(3));
        assert!(args.software_coverage);
    }
}
