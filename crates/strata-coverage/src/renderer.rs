//! Seam between the coverage estimator and whatever rasterizes the id pass.

use glam::Mat4;
use strata_math::Aabb;

use crate::encoding::SectorInstance;
use crate::error::GpuReadbackError;
use crate::gpu::OccluderPass;

/// Candidate boxes of one model, drawn with a single instanced call.
#[derive(Clone, Debug)]
pub struct InstanceBatch {
    pub model_matrix: Mat4,
    pub instances: Vec<SectorInstance>,
}

/// Everything a renderer needs to produce one id buffer.
#[derive(Clone, Copy, Debug)]
pub struct CoverageFrame<'a> {
    pub view_projection: Mat4,
    pub batches: &'a [InstanceBatch],
}

impl CoverageFrame<'_> {
    pub fn instance_count(&self) -> usize {
        self.batches.iter().map(|b| b.instances.len()).sum()
    }
}

/// Decoded id pass, row-major from the top-left pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdBuffer {
    pub width: u32,
    pub height: u32,
    pub ids: Vec<u32>,
}

impl IdBuffer {
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Depth written before sector boxes are drawn.
pub enum Occluders {
    None,
    /// World-space boxes, rasterized by the software renderer.
    Boxes(Vec<Aabb>),
    /// Depth pre-pass recorded into the GPU renderer's target.
    Pass(Box<dyn OccluderPass>),
}

impl std::fmt::Debug for Occluders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Boxes(boxes) => f.debug_tuple("Boxes").field(boxes).finish(),
            Self::Pass(_) => f.write_str("Pass(..)"),
        }
    }
}

/// Produces id buffers from coverage frames, possibly asynchronously.
///
/// At most one frame is in flight: `submit` while a previous frame is pending
/// replaces it.
pub trait CoverageRenderer {
    fn target_size(&self) -> (u32, u32);

    fn submit(&mut self, frame: &CoverageFrame<'_>) -> Result<(), GpuReadbackError>;

    /// Returns the pending result once available. With `wait` the call blocks
    /// until the submitted frame has been read back.
    fn poll(&mut self, wait: bool) -> Option<Result<IdBuffer, GpuReadbackError>>;

    /// Replaces the occluders used by later frames. Returns `false` and keeps
    /// the current ones when this renderer cannot draw the given kind.
    fn set_occluders(&mut self, occluders: Occluders) -> bool {
        matches!(occluders, Occluders::None)
    }
}

impl<R: CoverageRenderer + ?Sized> CoverageRenderer for Box<R> {
    fn target_size(&self) -> (u32, u32) {
        (**self).target_size()
    }

    fn submit(&mut self, frame: &CoverageFrame<'_>) -> Result<(), GpuReadbackError> {
        (**self).submit(frame)
    }

    fn poll(&mut self, wait: bool) -> Option<Result<IdBuffer, GpuReadbackError>> {
        (**self).poll(wait)
    }

    fn set_occluders(&mut self, occluders: Occluders) -> bool {
        (**self).set_occluders(occluders)
    }
}
