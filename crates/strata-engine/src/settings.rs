use strata_config::Config;
use strata_coverage::EstimatorSettings;
use strata_streaming::SchedulerSettings;

/// Everything the engine needs from configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineSettings {
    pub scheduler: SchedulerSettings,
    pub estimator: EstimatorSettings,
    /// Rank by coverage each time the camera moves. When off, rankings come
    /// only from [`crate::Engine::apply_ranking`].
    pub coverage_enabled: bool,
    pub override_capacity: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let streaming = &config.streaming;
        Self {
            scheduler: SchedulerSettings {
                worker_threads: streaming.worker_threads,
                max_concurrent_fetches: streaming.max_concurrent_fetches,
                request_budget: streaming.request_budget,
                release_grace_ticks: u64::from(streaming.release_grace_ticks),
                memory_budget_bytes: usize::try_from(streaming.memory_budget_bytes)
                    .unwrap_or(usize::MAX),
            },
            estimator: EstimatorSettings {
                detailed_threshold: streaming.detailed_coverage_threshold,
            },
            coverage_enabled: config.coverage.enabled,
            override_capacity: config.overrides.initial_capacity,
        }
    }
}
