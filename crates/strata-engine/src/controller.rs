//! State owned per loaded model.

use std::sync::Arc;

use glam::Mat4;
use strata_override::{OverrideWrite, TransformOverrideAllocator};
use strata_sector::{Classification, ModelId, SectorTree, resolve_quality};
use strata_streaming::{
    ErrorReporter, LoadCandidate, SchedulerSettings, SchedulerStats, SectorDataSource,
    SectorGeometrySink, SectorLoadScheduler, UpdateSummary,
};

/// One model's tree, load scheduler, quality classification and transform
/// overrides.
pub struct ModelController {
    id: ModelId,
    tree: Arc<SectorTree>,
    transform: Mat4,
    scheduler: SectorLoadScheduler,
    classification: Arc<Classification>,
    overrides: TransformOverrideAllocator,
    reported: SchedulerStats,
}

impl ModelController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ModelId,
        tree: Arc<SectorTree>,
        transform: Mat4,
        source: Arc<dyn SectorDataSource>,
        sink: Box<dyn SectorGeometrySink>,
        reporter: Arc<dyn ErrorReporter>,
        settings: SchedulerSettings,
        override_capacity: u32,
    ) -> std::io::Result<Self> {
        let mut scheduler = SectorLoadScheduler::new(id, Arc::clone(&tree), source, sink, settings)?;
        scheduler.set_reporter(reporter);
        let classification = Arc::new(resolve_quality(&tree, std::iter::empty()));
        Ok(Self {
            id,
            tree,
            transform,
            scheduler,
            classification,
            overrides: TransformOverrideAllocator::with_capacity(override_capacity),
            reported: SchedulerStats::default(),
        })
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn tree(&self) -> &Arc<SectorTree> {
        &self.tree
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub(crate) fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn scheduler(&self) -> &SectorLoadScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut SectorLoadScheduler {
        &mut self.scheduler
    }

    /// Classification as of the last [`refresh_classification`](Self::refresh_classification).
    pub fn classification(&self) -> &Arc<Classification> {
        &self.classification
    }

    pub fn overrides(&self) -> &TransformOverrideAllocator {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut TransformOverrideAllocator {
        &mut self.overrides
    }

    pub fn set_override(&mut self, tree_index: u32, transform: &Mat4) -> OverrideWrite {
        self.overrides.set(tree_index, transform)
    }

    pub fn remove_override(&mut self, tree_index: u32) -> Option<u32> {
        self.overrides.remove(tree_index)
    }

    pub(crate) fn apply_ranking(&mut self, candidates: &[LoadCandidate]) -> UpdateSummary {
        self.scheduler.update(candidates)
    }

    /// Recompute detailed/simple from the detailed geometry now resident.
    /// Returns whether the classification changed.
    pub fn refresh_classification(&mut self) -> bool {
        let resolved = resolve_quality(&self.tree, self.scheduler.resident_detailed_ids());
        if *self.classification == resolved {
            return false;
        }
        tracing::debug!(
            model = %self.id,
            detailed = resolved.detailed().len(),
            simple = resolved.simple().len(),
            "classification changed"
        );
        self.classification = Arc::new(resolved);
        true
    }

    /// Scheduler activity since the previous call.
    pub(crate) fn take_activity(&mut self) -> SchedulerStats {
        let now = self.scheduler.stats();
        let activity = now.since(&self.reported);
        self.reported = now;
        activity
    }

    /// Release everything resident, e.g. before the model is dropped.
    pub(crate) fn unload(&mut self) -> usize {
        let released = self.scheduler.release_all();
        self.scheduler.poll();
        released
    }
}
