//! Per-tick orchestration of coverage ranking, sector streaming and quality
//! resolution across any number of models.

mod controller;
mod engine;
mod error;
mod renderer;
mod settings;

pub use controller::ModelController;
pub use engine::{Engine, ModelTickReport, TickReport};
pub use error::EngineError;
pub use renderer::select_coverage_renderer;
pub use settings::EngineSettings;
