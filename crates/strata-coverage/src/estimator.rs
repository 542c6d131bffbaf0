//! Per-model candidate gathering and the rank/poll cycle.

use std::sync::Arc;

use glam::Mat4;
use strata_render::Camera;
use strata_sector::{CoverageFactors, ModelId, Sector, SectorId, SectorTree};

use crate::encoding::{MAX_ENCODED_ID, SectorInstance};
use crate::error::GpuReadbackError;
use crate::ranking::{IdLookup, PriorityEntry, rank_ids};
use crate::renderer::{CoverageFrame, CoverageRenderer, InstanceBatch};

/// Tunables for turning coverage into load candidates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorSettings {
    /// Coverage fraction at or above which a sector is ranked for its
    /// detailed payload.
    pub detailed_threshold: f32,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            detailed_threshold: 0.01,
        }
    }
}

struct RankedModel {
    id: ModelId,
    tree: Arc<SectorTree>,
    transform: Mat4,
    candidates: Option<Vec<SectorId>>,
}

/// Ranks sectors of every registered model by visible screen coverage.
pub struct CoverageEstimator<R> {
    renderer: R,
    settings: EstimatorSettings,
    models: Vec<RankedModel>,
    pending: Option<IdLookup>,
}

impl<R: CoverageRenderer> CoverageEstimator<R> {
    pub fn new(renderer: R, settings: EstimatorSettings) -> Self {
        Self {
            renderer,
            settings,
            models: Vec::new(),
            pending: None,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn settings(&self) -> EstimatorSettings {
        self.settings
    }

    /// Register a model, replacing any model with the same id.
    pub fn add_model(&mut self, id: ModelId, tree: Arc<SectorTree>, transform: Mat4) {
        self.remove_model(id);
        self.models.push(RankedModel {
            id,
            tree,
            transform,
            candidates: None,
        });
    }

    pub fn remove_model(&mut self, id: ModelId) -> bool {
        let before = self.models.len();
        self.models.retain(|m| m.id != id);
        before != self.models.len()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn set_model_transform(&mut self, id: ModelId, transform: Mat4) -> bool {
        match self.models.iter_mut().find(|m| m.id == id) {
            Some(model) => {
                model.transform = transform;
                true
            }
            None => false,
        }
    }

    /// Restrict a model's candidates to `visible`. `None` falls back to the
    /// sectors intersecting the camera frustum.
    pub fn set_candidates(&mut self, id: ModelId, visible: Option<Vec<SectorId>>) -> bool {
        match self.models.iter_mut().find(|m| m.id == id) {
            Some(model) => {
                model.candidates = visible;
                true
            }
            None => false,
        }
    }

    /// Render, read back and rank in one blocking call.
    ///
    /// Readback failures are logged and produce an empty ranking.
    pub fn rank(&mut self, camera: &Camera) -> Vec<PriorityEntry> {
        self.pending = None;
        if self.models.is_empty() {
            return Vec::new();
        }
        let lookup = match self.submit(camera) {
            Ok(lookup) => lookup,
            Err(err) => {
                tracing::warn!(error = %err, "coverage pass failed");
                return Vec::new();
            }
        };
        match self.renderer.poll(true) {
            Some(Ok(buffer)) => rank_ids(&buffer.ids, &lookup, self.settings.detailed_threshold),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "coverage readback failed");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Start a coverage pass without waiting for it. Returns `false` when a
    /// previous pass is still pending or submission failed.
    pub fn request_ranking(&mut self, camera: &Camera) -> bool {
        if self.pending.is_some() {
            return false;
        }
        match self.submit(camera) {
            Ok(lookup) => {
                self.pending = Some(lookup);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "coverage pass failed");
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Collect the ranking of the pending pass, if it has finished.
    /// A failed readback yields an empty ranking.
    pub fn poll_ranking(&mut self) -> Option<Vec<PriorityEntry>> {
        self.pending.as_ref()?;
        let result = self.renderer.poll(false)?;
        let lookup = self.pending.take()?;
        Some(match result {
            Ok(buffer) => rank_ids(&buffer.ids, &lookup, self.settings.detailed_threshold),
            Err(err) => {
                tracing::warn!(error = %err, "coverage readback failed");
                Vec::new()
            }
        })
    }

    fn submit(&mut self, camera: &Camera) -> Result<IdLookup, GpuReadbackError> {
        let (width, height) = self.renderer.target_size();
        if width == 0 || height == 0 {
            return Err(GpuReadbackError::ZeroSizedTarget);
        }
        let mut camera = camera.clone();
        camera.set_aspect_ratio(width as f32, height as f32);
        let view_projection = camera.view_projection_matrix();

        let (batches, lookup) = self.build_batches(&view_projection)?;
        tracing::trace!(candidates = lookup.len(), models = batches.len(), "coverage pass");
        self.renderer.submit(&CoverageFrame {
            view_projection,
            batches: &batches,
        })?;
        Ok(lookup)
    }

    fn build_batches(
        &self,
        view_projection: &Mat4,
    ) -> Result<(Vec<InstanceBatch>, IdLookup), GpuReadbackError> {
        let mut lookup = IdLookup::new();
        let mut batches = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let sectors: Vec<&Sector> = match &model.candidates {
                Some(ids) => ids.iter().filter_map(|&id| model.tree.get(id)).collect(),
                None => model
                    .tree
                    .sectors_intersecting_frustum(&(*view_projection * model.transform)),
            };

            let mut instances = Vec::with_capacity(sectors.len());
            for sector in sectors {
                let encoded = lookup.push(model.id, sector.id(), sector.has_simple_geometry());
                if encoded > MAX_ENCODED_ID {
                    return Err(GpuReadbackError::TooManySectors {
                        count: lookup.len(),
                    });
                }
                let bounds = sector.bounds();
                instances.push(SectorInstance {
                    min: bounds.min.to_array(),
                    encoded_id: encoded,
                    max: bounds.max.to_array(),
                    coverage: instance_coverage(sector.coverage_factors()),
                });
            }
            batches.push(InstanceBatch {
                model_matrix: model.transform,
                instances,
            });
        }
        Ok((batches, lookup))
    }
}

/// Stipple density for a sector box. Sectors without coverage information
/// draw solid.
fn instance_coverage(factors: CoverageFactors) -> f32 {
    let mean = (factors.xy + factors.yz + factors.xz) / 3.0;
    if mean > 0.0 { mean.min(1.0) } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use strata_math::Aabb;
    use strata_sector::{Fidelity, ModelMetadata, SectorRecord};

    use super::*;
    use crate::renderer::IdBuffer;
    use crate::software::SoftwareCoverageRenderer;

    fn single_box_tree(bounds: Aabb) -> Arc<SectorTree> {
        let metadata = ModelMetadata::new(vec![SectorRecord::new(1, None, bounds).with_faces(1.0, 10)]);
        Arc::new(SectorTree::load(&metadata).unwrap())
    }

    fn estimator() -> CoverageEstimator<SoftwareCoverageRenderer> {
        CoverageEstimator::new(
            SoftwareCoverageRenderer::new(64, 48).unwrap(),
            EstimatorSettings::default(),
        )
    }

    struct FailingRenderer;

    impl CoverageRenderer for FailingRenderer {
        fn target_size(&self) -> (u32, u32) {
            (8, 8)
        }

        fn submit(&mut self, _frame: &CoverageFrame<'_>) -> Result<(), GpuReadbackError> {
            Ok(())
        }

        fn poll(&mut self, _wait: bool) -> Option<Result<IdBuffer, GpuReadbackError>> {
            Some(Err(GpuReadbackError::ContextLost))
        }
    }

    #[test]
    fn test_no_models_ranks_nothing() {
        let mut estimator = estimator();
        assert!(estimator.rank(&Camera::default()).is_empty());
    }

    #[test]
    fn test_full_screen_sector_has_priority_one() {
        let mut estimator = estimator();
        let tree = single_box_tree(Aabb::new(Vec3::splat(-50.0), Vec3::splat(50.0)));
        estimator.add_model(ModelId(3), tree, Mat4::IDENTITY);

        let ranking = estimator.rank(&Camera::default());
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].model, ModelId(3));
        assert_eq!(ranking[0].sector, SectorId(1));
        assert_eq!(ranking[0].fidelity, Fidelity::Detailed);
        assert!((ranking[0].priority - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_entries_belong_to_their_model() {
        let mut estimator = estimator();
        let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        estimator.add_model(
            ModelId(1),
            single_box_tree(bounds),
            Mat4::from_translation(Vec3::new(-3.0, 0.0, -20.0)),
        );
        // Second model sits closer, so it covers more of the target.
        estimator.add_model(
            ModelId(2),
            single_box_tree(bounds),
            Mat4::from_translation(Vec3::new(2.0, 0.0, -10.0)),
        );

        let ranking = estimator.rank(&Camera::default());
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].model, ModelId(2));
        assert_eq!(ranking[1].model, ModelId(1));
        assert!(ranking[0].priority > ranking[1].priority);
        assert!(ranking.iter().all(|e| e.sector == SectorId(1)));
    }

    #[test]
    fn test_candidates_restrict_ranking() {
        let mut estimator = estimator();
        let tree = single_box_tree(Aabb::new(Vec3::splat(-50.0), Vec3::splat(50.0)));
        estimator.add_model(ModelId(0), tree, Mat4::IDENTITY);
        assert!(estimator.set_candidates(ModelId(0), Some(Vec::new())));
        assert!(estimator.rank(&Camera::default()).is_empty());

        estimator.set_candidates(ModelId(0), None);
        assert_eq!(estimator.rank(&Camera::default()).len(), 1);
    }

    #[test]
    fn test_offscreen_sector_is_omitted() {
        let mut estimator = estimator();
        let tree = single_box_tree(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        estimator.add_model(ModelId(0), tree, Mat4::from_translation(Vec3::new(0.0, 0.0, 30.0)));
        assert!(estimator.rank(&Camera::default()).is_empty());
    }

    #[test]
    fn test_readback_failure_yields_empty_ranking() {
        let mut estimator = CoverageEstimator::new(FailingRenderer, EstimatorSettings::default());
        let tree = single_box_tree(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        estimator.add_model(ModelId(0), tree, Mat4::IDENTITY);
        assert!(estimator.rank(&Camera::default()).is_empty());

        assert!(estimator.request_ranking(&Camera::default()));
        assert_eq!(estimator.poll_ranking(), Some(Vec::new()));
        assert!(!estimator.is_pending());
    }

    #[test]
    fn test_request_then_poll_matches_blocking_rank() {
        let mut estimator = estimator();
        let tree = single_box_tree(Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0)));
        estimator.add_model(ModelId(0), tree, Mat4::from_translation(Vec3::new(0.0, 0.0, -8.0)));
        let camera = Camera::default();

        let blocking = estimator.rank(&camera);
        assert!(estimator.request_ranking(&camera));
        assert!(!estimator.request_ranking(&camera));
        assert_eq!(estimator.poll_ranking(), Some(blocking));
        assert_eq!(estimator.poll_ranking(), None);
    }

    #[test]
    fn test_instance_coverage_defaults_to_solid() {
        assert_eq!(instance_coverage(CoverageFactors::default()), 1.0);
        let factors = CoverageFactors {
            xy: 0.3,
            yz: 0.6,
            xz: 0.0,
        };
        assert!((instance_coverage(factors) - 0.3).abs() < 1e-6);
    }
}
