//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub streaming: StreamingConfig,
    pub coverage: CoverageConfig,
    pub overrides: OverrideConfig,
    pub debug: DebugConfig,
    pub viewer: ViewerConfig,
}

/// Sector fetch scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Fetch worker threads (0 = derive from CPU count).
    pub worker_threads: usize,
    /// Fetches allowed in flight per model.
    pub max_concurrent_fetches: usize,
    /// Top-ranked entries considered for fetching each tick.
    pub request_budget: usize,
    /// Ticks a resident sector may stay out of the ranking before release.
    pub release_grace_ticks: u32,
    /// Coverage fraction at or above which a sector is fetched detailed.
    pub detailed_coverage_threshold: f32,
    /// Resident geometry bytes per model before forced eviction.
    pub memory_budget_bytes: u64,
}

/// Offscreen coverage pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoverageConfig {
    pub enabled: bool,
    pub render_width: u32,
    pub render_height: u32,
    /// Use the GPU renderer when an adapter is available.
    pub prefer_gpu: bool,
}

/// Transform override table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverrideConfig {
    /// Rows allocated up front (rounded up to a power of two).
    pub initial_capacity: u32,
}

/// Debug/development settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds. Empty = next to config.
    pub log_dir: String,
}

/// Headless viewer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Directory holding `scene.json` and `sectors/`.
    pub model_dir: String,
    /// Update ticks to run before exiting.
    pub ticks: u32,
    /// Camera orbit radius as a multiple of the model's bounding radius.
    pub orbit_radius_factor: f32,
    /// Pause between ticks in milliseconds.
    pub tick_interval_ms: u64,
}

// --- Default implementations ---

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_concurrent_fetches: 20,
            request_budget: 50,
            release_grace_ticks: 30,
            detailed_coverage_threshold: 0.01,
            memory_budget_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            render_width: 640,
            render_height: 480,
            prefer_gpu: true,
        }
    }
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_dir: "model".to_string(),
            ticks: 120,
            orbit_radius_factor: 2.5,
            tick_interval_ms: 16,
        }
    }
}

/// Platform config directory for Strata, falling back to `./config`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("strata"))
        .unwrap_or_else(|| PathBuf::from("config"))
}

// --- Load / Save / Reload ---

/// File name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let write_error = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_error)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(write_error)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE_NAME))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values that parse but would stall or break streaming.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        let threshold = self.streaming.detailed_coverage_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return invalid("streaming.detailed_coverage_threshold", "must be within 0..=1");
        }
        if self.streaming.max_concurrent_fetches == 0 {
            return invalid("streaming.max_concurrent_fetches", "must be at least 1");
        }
        if self.coverage.render_width == 0 || self.coverage.render_height == 0 {
            return invalid("coverage.render_width/render_height", "must be non-zero");
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}
