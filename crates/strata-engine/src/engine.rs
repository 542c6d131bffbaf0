//! The multi-model update loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Mat4;
use strata_coverage::{CoverageEstimator, CoverageRenderer, Occluders, PriorityEntry};
use strata_render::Camera;
use strata_sector::{
    Classification, MetadataCorruptError, ModelId, ModelMetadata, SectorId, SectorTree,
};
use strata_streaming::{
    ErrorReporter, LoadCandidate, LogErrorReporter, SchedulerStats, SectorDataSource,
    SectorGeometrySink, UpdateSummary,
};

use crate::controller::ModelController;
use crate::error::EngineError;
use crate::settings::EngineSettings;

/// What one tick did for one model.
#[derive(Clone, Debug)]
pub struct ModelTickReport {
    pub model: ModelId,
    pub update: UpdateSummary,
    /// Scheduler counters accumulated since the previous tick.
    pub activity: SchedulerStats,
    pub fetching: usize,
    pub resident: usize,
    pub resident_bytes: usize,
    pub classification_changed: bool,
    pub classification: Arc<Classification>,
}

#[derive(Clone, Debug)]
pub struct TickReport {
    pub tick: u64,
    /// Length of the ranking applied this tick, if a new one arrived.
    pub new_ranking: Option<usize>,
    pub models: Vec<ModelTickReport>,
}

/// Streams any number of models against one camera.
///
/// Each [`tick`](Self::tick) applies finished fetches, starts a coverage
/// pass if the camera moved, feeds the latest ranking to every model's
/// scheduler and recomputes quality classifications.
pub struct Engine<R> {
    settings: EngineSettings,
    estimator: CoverageEstimator<R>,
    models: BTreeMap<ModelId, ModelController>,
    reporter: Arc<dyn ErrorReporter>,
    camera: Option<Camera>,
    camera_dirty: bool,
    ranking: Vec<PriorityEntry>,
    tick: u64,
}

impl<R: CoverageRenderer> Engine<R> {
    pub fn new(renderer: R, settings: EngineSettings) -> Self {
        Self {
            settings,
            estimator: CoverageEstimator::new(renderer, settings.estimator),
            models: BTreeMap::new(),
            reporter: Arc::new(LogErrorReporter),
            camera: None,
            camera_dirty: false,
            ranking: Vec::new(),
            tick: 0,
        }
    }

    /// Reporter for models loaded after this call.
    pub fn set_reporter(&mut self, reporter: Arc<dyn ErrorReporter>) {
        self.reporter = reporter;
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn estimator(&self) -> &CoverageEstimator<R> {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut CoverageEstimator<R> {
        &mut self.estimator
    }

    /// Validate metadata and add the model. Corrupt metadata is reported and
    /// the model is not added.
    pub fn load_model(
        &mut self,
        id: ModelId,
        metadata: &ModelMetadata,
        transform: Mat4,
        source: Arc<dyn SectorDataSource>,
        sink: Box<dyn SectorGeometrySink>,
    ) -> Result<&ModelController, EngineError> {
        self.ensure_vacant(id)?;
        let tree = SectorTree::load(metadata).map_err(|err| self.corrupt(id, err))?;
        self.add_model(id, Arc::new(tree), transform, source, sink)
    }

    /// Like [`load_model`](Self::load_model), from a `scene.json` document.
    pub fn load_model_json(
        &mut self,
        id: ModelId,
        json: &str,
        transform: Mat4,
        source: Arc<dyn SectorDataSource>,
        sink: Box<dyn SectorGeometrySink>,
    ) -> Result<&ModelController, EngineError> {
        self.ensure_vacant(id)?;
        let tree = SectorTree::from_json(json).map_err(|err| self.corrupt(id, err))?;
        self.add_model(id, Arc::new(tree), transform, source, sink)
    }

    fn ensure_vacant(&self, id: ModelId) -> Result<(), EngineError> {
        if self.models.contains_key(&id) {
            return Err(EngineError::DuplicateModel(id));
        }
        Ok(())
    }

    fn corrupt(&self, model: ModelId, source: MetadataCorruptError) -> EngineError {
        self.reporter.report_metadata(model, &source);
        EngineError::Metadata { model, source }
    }

    /// Add a model whose tree is already built.
    pub fn add_model(
        &mut self,
        id: ModelId,
        tree: Arc<SectorTree>,
        transform: Mat4,
        source: Arc<dyn SectorDataSource>,
        sink: Box<dyn SectorGeometrySink>,
    ) -> Result<&ModelController, EngineError> {
        self.ensure_vacant(id)?;
        let controller = ModelController::new(
            id,
            Arc::clone(&tree),
            transform,
            source,
            sink,
            Arc::clone(&self.reporter),
            self.settings.scheduler,
            self.settings.override_capacity,
        )?;
        tracing::info!(
            model = %id,
            sectors = tree.sector_count(),
            unit = tree.unit(),
            "loaded model"
        );
        self.estimator.add_model(id, tree, transform);
        self.camera_dirty = self.camera.is_some();
        Ok(self.models.entry(id).or_insert(controller))
    }

    /// Unload a model, discarding all of its resident geometry.
    pub fn remove_model(&mut self, id: ModelId) -> Result<(), EngineError> {
        let mut controller = self.models.remove(&id).ok_or(EngineError::UnknownModel(id))?;
        let released = controller.unload();
        self.estimator.remove_model(id);
        self.ranking.retain(|entry| entry.model != id);
        tracing::info!(model = %id, released, "unloaded model");
        Ok(())
    }

    pub fn model(&self, id: ModelId) -> Option<&ModelController> {
        self.models.get(&id)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut ModelController> {
        self.models.get_mut(&id)
    }

    /// Loaded models in id order.
    pub fn models(&self) -> impl Iterator<Item = &ModelController> {
        self.models.values()
    }

    pub fn set_model_transform(&mut self, id: ModelId, transform: Mat4) -> Result<(), EngineError> {
        let controller = self.models.get_mut(&id).ok_or(EngineError::UnknownModel(id))?;
        controller.set_transform(transform);
        self.estimator.set_model_transform(id, transform);
        self.camera_dirty = self.camera.is_some();
        Ok(())
    }

    /// Limit coverage ranking of a model to `visible`; `None` ranks every
    /// sector in the camera frustum.
    pub fn set_visible_sectors(
        &mut self,
        id: ModelId,
        visible: Option<Vec<SectorId>>,
    ) -> Result<(), EngineError> {
        if !self.estimator.set_candidates(id, visible) {
            return Err(EngineError::UnknownModel(id));
        }
        self.camera_dirty = self.camera.is_some();
        Ok(())
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
        self.camera_dirty = true;
    }

    /// Replace the depth written before sector boxes in later coverage
    /// passes. Returns `false` when the renderer cannot draw this kind of
    /// occluder; the previous occluders then stay installed.
    pub fn set_occluders(&mut self, occluders: Occluders) -> bool {
        let accepted = self.estimator.renderer_mut().set_occluders(occluders);
        if accepted {
            self.camera_dirty = self.camera.is_some();
        } else {
            tracing::warn!("coverage renderer rejected occluders");
        }
        accepted
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Ranking currently driving the schedulers.
    pub fn ranking(&self) -> &[PriorityEntry] {
        &self.ranking
    }

    /// Replace the ranking directly, bypassing coverage estimation.
    pub fn apply_ranking(&mut self, ranking: Vec<PriorityEntry>) {
        self.ranking = ranking;
    }

    /// Rank now, blocking on the coverage readback.
    pub fn rank_now(&mut self) -> &[PriorityEntry] {
        if let Some(camera) = &self.camera {
            self.ranking = self.estimator.rank(camera);
            self.camera_dirty = false;
        }
        &self.ranking
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Run one update of the control loop.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;

        for controller in self.models.values_mut() {
            controller.scheduler_mut().poll();
        }

        let mut new_ranking = None;
        if self.settings.coverage_enabled {
            if self.camera_dirty
                && let Some(camera) = &self.camera
                && self.estimator.request_ranking(camera)
            {
                self.camera_dirty = false;
            }
            if let Some(ranking) = self.estimator.poll_ranking() {
                new_ranking = Some(ranking.len());
                self.ranking = ranking;
            }
        }

        let mut models = Vec::with_capacity(self.models.len());
        for (&id, controller) in &mut self.models {
            let candidates: Vec<LoadCandidate> = self
                .ranking
                .iter()
                .filter(|entry| entry.model == id)
                .map(|entry| LoadCandidate {
                    sector: entry.sector,
                    fidelity: entry.fidelity,
                    priority: entry.priority,
                })
                .collect();
            let update = controller.apply_ranking(&candidates);
            let classification_changed = controller.refresh_classification();
            let scheduler = controller.scheduler();
            let (fetching, resident, resident_bytes) = (
                scheduler.fetching_count(),
                scheduler.resident_count(),
                scheduler.resident_bytes(),
            );
            models.push(ModelTickReport {
                model: id,
                update,
                activity: controller.take_activity(),
                fetching,
                resident,
                resident_bytes,
                classification_changed,
                classification: Arc::clone(controller.classification()),
            });
        }

        TickReport {
            tick: self.tick,
            new_ranking,
            models,
        }
    }

    /// Apply completions until no model has a fetch in flight.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.models.values_mut().all(|controller| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            controller.scheduler_mut().wait_until_idle(remaining)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use glam::Vec3;
    use strata_coverage::SoftwareCoverageRenderer;
    use strata_math::Aabb;
    use strata_sector::{Fidelity, SectorRecord};
    use strata_streaming::{
        CallbackSink, MemoryDataSource, MeshVertex, QuadPrimitive, SectorFetchError,
        encode_detailed, encode_simple,
    };

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn metadata() -> ModelMetadata {
        let b = |min: [f32; 3], max: [f32; 3]| Aabb::new(Vec3::from(min), Vec3::from(max));
        ModelMetadata::new(vec![
            SectorRecord::new(1, None, b([-10.0; 3], [10.0; 3])).with_faces(1.0, 10),
            SectorRecord::new(2, Some(1), b([-10.0, -10.0, -10.0], [0.0, 10.0, 10.0]))
                .with_faces(1.0, 10),
            SectorRecord::new(3, Some(1), b([0.0, -10.0, -10.0], [10.0, 10.0, 10.0]))
                .with_faces(1.0, 10),
        ])
    }

    fn source() -> Arc<MemoryDataSource> {
        let mut source = MemoryDataSource::new();
        for id in 1..=3 {
            source.insert(SectorId(id), Fidelity::Simple, encode_simple(&[QuadPrimitive::default()]));
            source.insert(
                SectorId(id),
                Fidelity::Detailed,
                encode_detailed(&[MeshVertex::default(); 3], &[0, 1, 2]),
            );
        }
        Arc::new(source)
    }

    fn null_sink() -> Box<dyn SectorGeometrySink> {
        Box::new(CallbackSink::new(|_, _, _| {}, |_, _| {}))
    }

    fn engine() -> Engine<SoftwareCoverageRenderer> {
        let mut settings = EngineSettings::default();
        settings.scheduler.worker_threads = 2;
        Engine::new(SoftwareCoverageRenderer::new(64, 48).unwrap(), settings)
    }

    fn camera() -> Camera {
        Camera::looking_at(Vec3::new(0.0, 0.0, 40.0), Vec3::ZERO, Vec3::Y)
    }

    #[derive(Default)]
    struct Collect {
        metadata: Mutex<Vec<ModelId>>,
    }

    impl ErrorReporter for Collect {
        fn report_fetch(&self, _model: ModelId, _error: &SectorFetchError) {}

        fn report_metadata(&self, model: ModelId, _error: &MetadataCorruptError) {
            self.metadata.lock().unwrap().push(model);
        }
    }

    #[test]
    fn test_camera_change_streams_detail_and_classifies() {
        let mut engine = engine();
        engine
            .load_model(ModelId(0), &metadata(), Mat4::IDENTITY, source(), null_sink())
            .unwrap();
        engine.set_camera(camera());

        let first = engine.tick();
        assert!(first.new_ranking.is_some_and(|n| n > 0));
        assert!(first.models[0].update.requested > 0);
        assert!(engine.wait_until_idle(WAIT));

        let second = engine.tick();
        let report = &second.models[0];
        assert!(report.classification_changed);
        assert!(report.classification.is_detailed(SectorId(1)));
        assert!(report.resident > 0);
        assert_eq!(second.new_ranking, None);
    }

    #[test]
    fn test_corrupt_metadata_is_reported_and_not_loaded() {
        let mut engine = engine();
        let reporter = Arc::new(Collect::default());
        engine.set_reporter(reporter.clone());

        let mut bad = metadata();
        bad.sectors[1].parent_id = 42;
        let err = engine
            .load_model(ModelId(5), &bad, Mat4::IDENTITY, source(), null_sink())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Metadata { model: ModelId(5), .. }));

        let err = engine
            .load_model_json(ModelId(6), "{ not json", Mat4::IDENTITY, source(), null_sink())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Metadata { model: ModelId(6), .. }));

        assert_eq!(*reporter.metadata.lock().unwrap(), vec![ModelId(5), ModelId(6)]);
        assert_eq!(engine.models().count(), 0);
    }

    #[test]
    fn test_duplicate_and_unknown_models() {
        let mut engine = engine();
        engine
            .load_model(ModelId(1), &metadata(), Mat4::IDENTITY, source(), null_sink())
            .unwrap();
        assert!(matches!(
            engine.load_model(ModelId(1), &metadata(), Mat4::IDENTITY, source(), null_sink()),
            Err(EngineError::DuplicateModel(ModelId(1)))
        ));
        assert!(matches!(
            engine.remove_model(ModelId(9)),
            Err(EngineError::UnknownModel(ModelId(9)))
        ));
        assert!(engine.set_model_transform(ModelId(9), Mat4::IDENTITY).is_err());
    }

    #[test]
    fn test_manual_ranking_drives_scheduler() {
        let mut settings = EngineSettings::default();
        settings.coverage_enabled = false;
        settings.scheduler.worker_threads = 1;
        let mut engine = Engine::new(SoftwareCoverageRenderer::new(8, 8).unwrap(), settings);
        engine
            .load_model(ModelId(0), &metadata(), Mat4::IDENTITY, source(), null_sink())
            .unwrap();
        engine.set_camera(camera());

        assert_eq!(engine.tick().models[0].update.requested, 0);
        engine.apply_ranking(vec![PriorityEntry {
            model: ModelId(0),
            sector: SectorId(3),
            fidelity: Fidelity::Detailed,
            priority: 0.4,
        }]);
        assert_eq!(engine.tick().models[0].update.requested, 1);
        assert!(engine.wait_until_idle(WAIT));

        let report = engine.tick();
        let classification = &report.models[0].classification;
        assert_eq!(
            classification.detailed().iter().copied().collect::<Vec<_>>(),
            vec![SectorId(1), SectorId(3)]
        );
        assert_eq!(classification.fidelity(SectorId(2)), Some(Fidelity::Simple));
    }

    #[test]
    fn test_ranking_is_split_between_models() {
        let mut engine = engine();
        engine
            .load_model(ModelId(1), &metadata(), Mat4::IDENTITY, source(), null_sink())
            .unwrap();
        engine
            .load_model(
                ModelId(2),
                &metadata(),
                Mat4::from_translation(Vec3::new(500.0, 0.0, 0.0)),
                source(),
                null_sink(),
            )
            .unwrap();
        engine.set_camera(camera());
        engine.rank_now();

        // The second model is far off to the side and out of view.
        assert!(!engine.ranking().is_empty());
        assert!(engine.ranking().iter().all(|e| e.model == ModelId(1)));

        let report = engine.tick();
        assert!(report.models[0].update.requested > 0);
        assert_eq!(report.models[1].update.requested, 0);
    }

    #[test]
    fn test_remove_model_discards_resident_geometry() {
        let discarded = Arc::new(Mutex::new(0usize));
        let counter = discarded.clone();
        let sink = CallbackSink::new(|_, _, _| {}, move |_, _| *counter.lock().unwrap() += 1);

        let mut engine = engine();
        engine
            .load_model(ModelId(0), &metadata(), Mat4::IDENTITY, source(), Box::new(sink))
            .unwrap();
        engine.set_camera(camera());
        engine.tick();
        assert!(engine.wait_until_idle(WAIT));
        let resident = engine.model(ModelId(0)).unwrap().scheduler().resident_count();
        assert!(resident > 0);

        engine.remove_model(ModelId(0)).unwrap();
        assert_eq!(*discarded.lock().unwrap(), resident);
        assert!(engine.ranking().is_empty());
        assert_eq!(engine.estimator().model_count(), 0);
    }

    #[test]
    fn test_overrides_are_per_model() {
        let mut engine = engine();
        engine
            .load_model(ModelId(0), &metadata(), Mat4::IDENTITY, source(), null_sink())
            .unwrap();
        let controller = engine.model_mut(ModelId(0)).unwrap();
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let write = controller.set_override(77, &transform);
        assert_eq!(controller.overrides().get(77), Some(transform));
        assert_eq!(controller.remove_override(77), Some(write.row));
        assert!(controller.overrides().is_empty());
    }
}
