//! End-to-end streaming from payload files on disk.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glam::{Mat4, Vec3};
use strata_coverage::{CoverageRenderer, Occluders, SoftwareCoverageRenderer};
use strata_engine::{Engine, EngineSettings};
use strata_math::Aabb;
use strata_render::Camera;
use strata_sector::{Fidelity, ModelId, SectorId};
use strata_streaming::{
    CallbackSink, FileDataSource, MeshVertex, QuadPrimitive, encode_detailed, encode_simple,
};

const SCENE: &str = r#"{
    "version": 8,
    "maxTreeIndex": 12,
    "unit": "m",
    "sectors": [
        {
            "id": 0, "parentId": -1, "path": "0/", "depth": 0,
            "boundingBox": { "min": { "x": -8.0, "y": -8.0, "z": -8.0 }, "max": { "x": 8.0, "y": 8.0, "z": 8.0 } },
            "indexFile": { "fileName": "sector_0.i3d", "peripheralFiles": [], "downloadSize": 96 },
            "facesFile": { "quadSize": 0.5, "coverageFactors": { "xy": 0.2, "yz": 0.2, "xz": 0.2 }, "downloadSize": 36 }
        },
        {
            "id": 1, "parentId": 0, "path": "0/0/", "depth": 1,
            "boundingBox": { "min": { "x": -8.0, "y": -8.0, "z": -8.0 }, "max": { "x": 0.0, "y": 8.0, "z": 8.0 } },
            "indexFile": { "fileName": "sector_1.i3d", "peripheralFiles": [], "downloadSize": 96 },
            "facesFile": { "quadSize": 0.5, "coverageFactors": { "xy": 0.9, "yz": 0.9, "xz": 0.9 }, "downloadSize": 36 }
        },
        {
            "id": 2, "parentId": 0, "path": "0/1/", "depth": 1,
            "boundingBox": { "min": { "x": 0.0, "y": -8.0, "z": -8.0 }, "max": { "x": 8.0, "y": 8.0, "z": 8.0 } },
            "indexFile": { "fileName": "sector_2.i3d", "peripheralFiles": [], "downloadSize": 96 },
            "facesFile": { "quadSize": 0.5, "coverageFactors": { "xy": 0.9, "yz": 0.9, "xz": 0.9 }, "downloadSize": 36 }
        }
    ]
}"#;

fn write_payloads(root: &Path) {
    let source = FileDataSource::new(root);
    fs::create_dir_all(root.join("sectors")).unwrap();
    for id in 0..3 {
        let sector = SectorId(id);
        fs::write(
            source.payload_path(sector, Fidelity::Simple),
            encode_simple(&[QuadPrimitive::default(); 2]),
        )
        .unwrap();
        fs::write(
            source.payload_path(sector, Fidelity::Detailed),
            encode_detailed(&[MeshVertex::default(); 4], &[0, 1, 2, 2, 3, 0]),
        )
        .unwrap();
    }
}

fn settle(engine: &mut Engine<SoftwareCoverageRenderer>, ticks: usize) {
    for _ in 0..ticks {
        engine.tick();
        assert!(engine.wait_until_idle(Duration::from_secs(5)));
    }
}

#[test]
fn test_stream_in_then_release_after_looking_away() {
    let dir = tempfile::tempdir().unwrap();
    write_payloads(dir.path());

    let resident = Arc::new(Mutex::new(Vec::new()));
    let (added, removed) = (resident.clone(), resident.clone());
    let sink = CallbackSink::new(
        move |sector, fidelity, _geometry| added.lock().unwrap().push((sector, fidelity)),
        move |sector, fidelity| removed.lock().unwrap().retain(|&key| key != (sector, fidelity)),
    );

    let mut settings = EngineSettings::default();
    settings.scheduler.worker_threads = 2;
    settings.scheduler.release_grace_ticks = 2;
    let mut engine = Engine::new(SoftwareCoverageRenderer::new(80, 60).unwrap(), settings);
    let model = ModelId(3);
    engine
        .load_model_json(
            model,
            SCENE,
            Mat4::IDENTITY,
            Arc::new(FileDataSource::new(dir.path())),
            Box::new(sink),
        )
        .unwrap();

    engine.set_camera(Camera::looking_at(Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO, Vec3::Y));
    settle(&mut engine, 2);

    let controller = engine.model(model).unwrap();
    assert!(controller.scheduler().resident_count() > 0);
    assert!(controller.classification().is_detailed(SectorId(0)));
    assert_eq!(resident.lock().unwrap().len(), controller.scheduler().resident_count());

    // Face away from the model; nothing is ranked any more.
    engine.set_camera(Camera::looking_at(Vec3::new(0.0, 0.0, 30.0), Vec3::new(0.0, 0.0, 60.0), Vec3::Y));
    settle(&mut engine, 6);

    assert!(engine.ranking().is_empty());
    let controller = engine.model(model).unwrap();
    assert_eq!(controller.scheduler().resident_count(), 0);
    assert!(controller.classification().detailed().is_empty());
    assert_eq!(
        controller.classification().simple().iter().copied().collect::<Vec<_>>(),
        vec![SectorId(0)]
    );
    assert!(resident.lock().unwrap().is_empty());
}

#[test]
fn test_missing_payload_files_are_counted_as_failures() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = EngineSettings::default();
    settings.scheduler.worker_threads = 1;
    let mut engine = Engine::new(SoftwareCoverageRenderer::new(32, 24).unwrap(), settings);
    engine
        .load_model_json(
            ModelId(0),
            SCENE,
            Mat4::IDENTITY,
            Arc::new(FileDataSource::new(dir.path())),
            Box::new(CallbackSink::new(|_, _, _| {}, |_, _| {})),
        )
        .unwrap();
    engine.set_camera(Camera::looking_at(Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO, Vec3::Y));

    let issued = engine.tick().models[0].activity.issued;
    assert!(issued > 0);
    assert!(engine.wait_until_idle(Duration::from_secs(5)));
    let report = engine.tick();
    assert_eq!(report.models[0].activity.failed, issued);
    assert_eq!(report.models[0].resident, 0);
}

#[test]
fn test_occluders_reach_a_boxed_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let renderer: Box<dyn CoverageRenderer> = Box::new(SoftwareCoverageRenderer::new(32, 24).unwrap());
    let mut engine = Engine::new(renderer, EngineSettings::default());
    engine
        .load_model_json(
            ModelId(0),
            SCENE,
            Mat4::IDENTITY,
            Arc::new(FileDataSource::new(dir.path())),
            Box::new(CallbackSink::new(|_, _, _| {}, |_, _| {})),
        )
        .unwrap();
    engine.set_camera(Camera::looking_at(Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO, Vec3::Y));
    assert!(!engine.rank_now().is_empty());

    // A wall between the camera and the model.
    let wall = Aabb::new(Vec3::new(-100.0, -100.0, 15.0), Vec3::new(100.0, 100.0, 16.0));
    assert!(engine.set_occluders(Occluders::Boxes(vec![wall])));
    assert!(engine.rank_now().is_empty());

    assert!(engine.set_occluders(Occluders::None));
    assert!(!engine.rank_now().is_empty());
}
