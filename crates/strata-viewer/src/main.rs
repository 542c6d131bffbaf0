//! Headless viewer that streams a model directory along an orbiting camera.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p strata-viewer -- --model-dir path/to/model`.

mod orbit;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glam::Mat4;
use strata_config::{CliArgs, Config, default_config_dir};
use strata_engine::{Engine, EngineSettings, TickReport, select_coverage_renderer};
use strata_sector::ModelId;
use strata_streaming::{CallbackSink, FileDataSource, SectorGeometry};
use tracing::{error, info};

use crate::orbit::OrbitPath;

const SCENE_FILE: &str = "scene.json";

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let log_dir = strata_log::resolve_log_dir(&config, &config_dir);
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), String> {
    let model_dir = PathBuf::from(&config.viewer.model_dir);
    let scene = read_scene(&model_dir)?;

    let renderer = select_coverage_renderer(&config.coverage)
        .map_err(|e| format!("no coverage renderer: {e}"))?;
    let mut engine = Engine::new(renderer, EngineSettings::from_config(config));

    let model = ModelId(0);
    let sink = CallbackSink::new(
        |sector, fidelity, geometry: SectorGeometry| {
            tracing::debug!(
                %sector,
                %fidelity,
                primitives = geometry.primitive_count(),
                bytes = geometry.byte_size(),
                "geometry ready"
            );
        },
        |sector, fidelity| tracing::debug!(%sector, %fidelity, "geometry discarded"),
    );
    let bounds = *engine
        .load_model_json(
            model,
            &scene,
            Mat4::IDENTITY,
            Arc::new(FileDataSource::new(&model_dir)),
            Box::new(sink),
        )
        .map_err(|e| e.to_string())?
        .tree()
        .bounds();

    let ticks = config.viewer.ticks;
    let path = OrbitPath::around(&bounds, config.viewer.orbit_radius_factor, ticks);
    let interval = Duration::from_millis(config.viewer.tick_interval_ms);
    info!(model_dir = %model_dir.display(), ticks, "streaming model");

    for tick in 0..ticks {
        engine.set_camera(path.camera_at(tick));
        let report = engine.tick();
        log_report(&report);
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    if !engine.wait_until_idle(Duration::from_secs(10)) {
        tracing::warn!("fetches still in flight at exit");
    }
    let stats = engine
        .model(model)
        .map(|controller| controller.scheduler().stats())
        .unwrap_or_default();
    info!(
        issued = stats.issued,
        consumed = stats.consumed,
        failed = stats.failed,
        released = stats.released,
        evicted = stats.evicted,
        "done"
    );
    Ok(())
}

fn read_scene(model_dir: &Path) -> Result<String, String> {
    let path = model_dir.join(SCENE_FILE);
    std::fs::read_to_string(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))
}

fn log_report(report: &TickReport) {
    for model in &report.models {
        info!(
            tick = report.tick,
            model = %model.model,
            ranked = ?report.new_ranking,
            requested = model.update.requested,
            deferred = model.update.deferred,
            released = model.update.released + model.update.evicted,
            fetching = model.fetching,
            resident = model.resident,
            resident_kib = model.resident_bytes / 1024,
            detailed = model.classification.detailed().len(),
            simple = model.classification.simple().len(),
            "tick"
        );
    }
}
