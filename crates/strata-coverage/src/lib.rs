//! Screen-coverage ranking of sectors.
//!
//! Candidate sector boxes are rasterized into a small offscreen target with
//! one color-encoded id per sector and depth testing against occluders. The
//! per-id pixel histogram gives each sector's visible coverage, which orders
//! what the streaming scheduler fetches next.

mod encoding;
mod error;
mod estimator;
mod gpu;
mod ranking;
mod renderer;
mod software;

pub use encoding::{EMPTY_ID, MAX_ENCODED_ID, SectorInstance, decode_rgba, encode_rgba, stipple_keep};
pub use error::GpuReadbackError;
pub use estimator::{CoverageEstimator, EstimatorSettings};
pub use gpu::{COVERAGE_SHADER_SOURCE, GpuCoverageRenderer, OccluderPass};
pub use ranking::{IdLookup, PriorityEntry, rank_ids};
pub use renderer::{CoverageFrame, CoverageRenderer, IdBuffer, InstanceBatch, Occluders};
pub use software::SoftwareCoverageRenderer;
